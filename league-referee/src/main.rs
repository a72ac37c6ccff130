//! Referee entrypoint (spec §6): loads configuration, recovers any
//! leftover match checkpoint, registers with the League Manager to
//! obtain this referee's auth token and signing secret, spawns the
//! coordinator task, and serves the HTTP surface. Mirrors
//! `league-manager/src/main.rs`'s startup sequence.

mod checkpoint;
mod config;
mod coordinator;
mod executor;
mod http;
mod state;
mod transport;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpServer};
use league_game::GameRegistry;
use league_protocol::audit::AuditLog;
use league_protocol::envelope::MessageType;
use league_protocol::jsonrpc::RpcResponse;
use league_protocol::messages::{RegisterRefereePayload, RegistrationResponsePayload};

use crate::config::Config;
use crate::http::AppState;
use crate::state::{Identity, RefereeState};

/// Exit codes (spec §6): 0 clean shutdown, 1 config error (unused —
/// `from_env` always falls back to defaults), 2 bind error, 3 local
/// I/O error (audit log), 4 registration with the Manager failed.
#[actix_web::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let recovered = checkpoint::recover(&config.checkpoint_path);
    if let Some(cp) = &recovered {
        tracing::warn!(match_id = %cp.match_id, phase = %cp.phase, "recovered stale checkpoint at startup");
    }

    let audit_path = format!("{}.audit.ndjson", config.checkpoint_path);
    let audit = match AuditLog::open(&audit_path) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            tracing::error!(error = %e, "failed to open audit log");
            return ExitCode::from(3);
        }
    };

    let games = Arc::new(GameRegistry::with_reference_games());
    let referee_state = Arc::new(RefereeState::default());

    let client = reqwest::Client::new();
    let identity = match register_with_manager(&client, &config, &audit).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(error = %e, "failed to register with league manager");
            return ExitCode::from(4);
        }
    };
    if let Some(cp) = recovered.filter(|cp| !cp.is_terminal()) {
        report_recovered_match_error(&client, &config, &audit, &identity, &cp).await;
    }
    referee_state.set_identity(identity);

    let commands = coordinator::spawn(referee_state.clone(), config.clone(), games, audit.clone());

    let app_state = web::Data::new(AppState {
        commands,
        referee: referee_state,
        audit,
        config: config.clone(),
        started_at: Instant::now(),
    });

    tracing::info!(host = %config.host, port = config.port, agent_id = %config.agent_id, "league-referee starting");

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
    let payload = RegisterRefereePayload {
        agent_id: config.agent_id.clone(),
        endpoint: config.endpoint.clone(),
    };
    let response = transport::send(
        client,
        &config.manager_endpoint,
        MessageType::RegisterReferee,
        &config.agent_id,
        "",
        None,
        None,
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

/// A checkpoint surviving to process restart in a non-terminal phase
/// means this referee died mid-match (spec §4.7). There is no safe way
/// to resume the step loop, so the Manager is told the match ended
/// `ERRORED` the same way `executor::report_match_error` would, freeing
/// the match to be errored out and this referee to leave its exclusion
/// from the idle pool once `referee_cooldown_seconds` elapses
/// (DESIGN.md Open Question 3) instead of being stuck forever.
async fn report_recovered_match_error(
    client: &reqwest::Client,
    config: &Config,
    audit: &AuditLog,
    identity: &Identity,
    cp: &crate::checkpoint::Checkpoint,
) {
    let payload = league_protocol::messages::MatchErrorPayload {
        match_id: cp.match_id.clone(),
        reason: format!("referee_restarted_mid_match:{}", cp.phase),
    };
    let result = transport::send(
        client,
        &config.manager_endpoint,
        MessageType::MatchError,
        &config.agent_id,
        &identity.league_id,
        Some(&identity.auth_token),
        Some((cp.round_id, cp.match_id.as_str())),
        Some(cp.game_type.as_str()),
        serde_json::to_value(&payload).expect("MatchErrorPayload always serializes"),
        config.retry_max,
        Duration::from_millis(config.retry_backoff_ms),
        audit,
        "league_manager",
    )
    .await;
    if let Err(e) = result {
        tracing::error!(match_id = %cp.match_id, error = %e, "failed to report recovered checkpoint as MATCH_ERROR");
    }
}
