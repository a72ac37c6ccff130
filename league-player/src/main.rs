//! Player entrypoint (spec §6): loads configuration, registers with the
//! League Manager to obtain this player's auth token and signing secret,
//! spawns the coordinator task, and serves the HTTP surface. Mirrors
//! `league-referee/src/main.rs`'s startup sequence, minus the checkpoint
//! recovery step a player has no match-lifecycle state to recover.

mod config;
mod coordinator;
mod http;
mod state;
mod strategy;
mod transport;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpServer};
use league_protocol::audit::AuditLog;
use league_protocol::envelope::MessageType;
use league_protocol::jsonrpc::RpcResponse;
use league_protocol::messages::{RegisterPlayerPayload, RegistrationResponsePayload};

use crate::config::Config;
use crate::http::AppState;
use crate::state::{Identity, PlayerState};

/// Exit codes (spec §6): 0 clean shutdown, 2 bind error, 3 local I/O
/// error (audit log), 4 registration with the Manager failed.
#[actix_web::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let audit_path = format!("{}.audit.ndjson", config.agent_id);
    let audit = match AuditLog::open(&audit_path) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            tracing::error!(error = %e, "failed to open audit log");
            return ExitCode::from(3);
        }
    };

    let player_state = Arc::new(PlayerState::default());

    let client = reqwest::Client::new();
    let identity = match register_with_manager(&client, &config, &audit).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(error = %e, "failed to register with league manager");
            return ExitCode::from(4);
        }
    };
    player_state.set_identity(identity);

    let commands = coordinator::spawn(player_state.clone());

    let app_state = web::Data::new(AppState {
        commands,
        player: player_state,
        audit,
        config: config.clone(),
        started_at: Instant::now(),
    });

    tracing::info!(host = %config.host, port = config.port, agent_id = %config.agent_id, "league-player starting");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/health", web::get().to(http::health))
            .route("/mcp", web::post().to(http::handle))
    })
    .bind((config.host.as_str(), config.port));

    let server = match server {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind HTTP listener");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server terminated with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn register_with_manager(client: &reqwest::Client, config: &Config, audit: &AuditLog) -> anyhow::Result<Identity> {
    let payload = RegisterPlayerPayload {
        agent_id: config.agent_id.clone(),
        endpoint: config.endpoint.clone(),
    };
    let response = transport::send(
        client,
        &config.manager_endpoint,
        MessageType::RegisterPlayer,
        &config.agent_id,
        "",
        None,
        serde_json::to_value(&payload)?,
        config.retry_max,
        Duration::from_millis(config.retry_backoff_ms),
        audit,
        "league_manager",
    )
    .await?;

    let rpc: RpcResponse = serde_json::from_value(response)?;
    let result = match rpc {
        RpcResponse::Success { result, .. } => result,
        RpcResponse::Error { error, .. } => return Err(anyhow::anyhow!(error.message)),
    };
    let reg: RegistrationResponsePayload = serde_json::from_value(result["payload"].clone())?;

    Ok(Identity {
        league_id: reg.league_id,
        auth_token: reg.auth_token,
        signing_secret: reg.signing_secret,
    })
}
