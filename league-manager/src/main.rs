//! League Manager entrypoint (spec §6): loads configuration, opens the
//! database and audit log, creates (or resumes) the single league this
//! process owns, spawns the coordinator task, and serves the HTTP
//! surface: env loading, `tracing-subscriber` init, then
//! `HttpServer::bind(...).run()`.

mod auth;
mod config;
mod coordinator;
mod http;
mod scheduler;
mod standings;
mod transport;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, App, HttpServer};
use league_game::GameRegistry;
use league_protocol::audit::AuditLog;
use league_storage::{LeagueRow, Store};

use crate::config::Config;
use crate::http::AppState;

/// Exit codes (spec §6): 0 clean shutdown, 1 config error, 2 bind
/// error, 3 persistence (storage/audit log) error, 4 league-creation
/// error.
#[actix_web::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let league_id = std::env::var("LEAGUE_ID").unwrap_or_else(|_| format!("league-{}", uuid::Uuid::new_v4()));

    let store = match Store::connect(&config.database_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            return ExitCode::from(3);
        }
    };

    let audit_path = format!("{}.audit.ndjson", config.database_path);
    let audit = match AuditLog::open(&audit_path) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            tracing::error!(error = %e, "failed to open audit log");
            return ExitCode::from(3);
        }
    };

    let league = match init_league(&store, &league_id).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to create or resume league");
            return ExitCode::from(4);
        }
    };

    let games = GameRegistry::with_reference_games();
    let commands = coordinator::spawn(store.clone(), audit.clone(), games, config.clone(), league_id.clone(), league.signing_secret.clone());

    let state = web::Data::new(AppState {
        commands,
        audit,
        config: config.clone(),
        league_id: league_id.clone(),
        store,
        started_at: Instant::now(),
    });

    tracing::info!(host = %config.host, port = config.port, league_id, "league-manager starting");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
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

/// Resumes the single league this process owns, or creates it on first
/// boot, opening registration if it hasn't started yet. This chains
/// three fallible persistence calls at the one real service boundary
/// `main` crosses before it can serve traffic, so it is where this
/// binary reaches for `anyhow::Result` the way the teacher's service
/// methods do, rather than threading a one-off error type through three
/// separate `match` arms.
async fn init_league(store: &Store, league_id: &str) -> anyhow::Result<LeagueRow> {
    let league = match store.get_league(league_id).await {
        Ok(existing) => {
            tracing::info!(league_id, status = ?existing.status, "resuming existing league");
            existing
        }
        Err(_) => {
            let signing_secret = auth::generate_signing_secret();
            store.create_league(league_id, &signing_secret).await?
        }
    };

    if league.status == league_storage::LeagueStatus::Init {
        store
            .advance_league_status(league_id, league_storage::LeagueStatus::Registration)
            .await?;
    }

    Ok(league)
}
