//! Vocalis gateway: HTTP API over the voice authentication core.
//!
//! Usage:
//!   vocalis-gateway [--port 8000] [--db data/vocalis/vocalis.db] [--config vocalis.toml]
//!
//! Configuration precedence: --config TOML file when given, environment
//! otherwise (see VocalisConfig). The collaborator backends are picked from
//! the environment: remote extractor/transcriber when their API variables
//! are set, deterministic placeholders otherwise.

mod routes;

use axum::routing::{get, post};
use axum::Router;
use routes::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vocalis_core::{
    ChallengeEngine, DecisionEngine, ProfileStore, TemplateFusion, VocalisConfig,
};
use vocalis_voice::{create_extractor, create_transcriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut port: u16 = 8000;
    let mut db_override: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--port" => {
                if let Some(p) = args.next() {
                    port = p.parse().unwrap_or(8000);
                }
            }
            "--db" => {
                db_override = args.next().map(PathBuf::from);
            }
            "--config" => {
                config_path = args.next().map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Vocalis — voice authentication gateway");
                eprintln!("  --port N         Listen port (default 8000)");
                eprintln!("  --db PATH        SQLite database file (overrides config)");
                eprintln!("  --config PATH    TOML config file (default: environment)");
                eprintln!();
                eprintln!("Remote backends: EMBEDDING_API_URL / STT_API_KEY select the");
                eprintln!("production extractor and transcriber; placeholders otherwise.");
                return Ok(());
            }
            _ => {}
        }
    }

    let mut config = match &config_path {
        Some(path) => VocalisConfig::load_from_path(path)?,
        None => VocalisConfig::from_env(),
    };
    if let Some(db) = db_override {
        config.database.db_path = db;
    }

    let store = Arc::new(ProfileStore::open(
        &config.database.db_path,
        config.embedding.dim,
    )?);
    let fusion = TemplateFusion::new(store.clone(), &config.verification);
    let challenges = ChallengeEngine::new(store.clone(), &config.liveness);
    let decisions = DecisionEngine::new(
        store.clone(),
        challenges.clone(),
        &config.verification,
        &config.liveness,
    );
    let extractor = create_extractor(config.embedding.dim)?;
    let transcriber = create_transcriber()?;

    info!(
        db = %config.database.db_path.display(),
        embedding_dim = config.embedding.dim,
        liveness = config.liveness.enabled,
        "vocalis gateway starting"
    );

    let state = Arc::new(AppState {
        config,
        store,
        fusion,
        challenges,
        decisions,
        extractor,
        transcriber,
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/enroll", post(routes::enroll))
        .route("/users", get(routes::list_users))
        .route(
            "/users/:user_id",
            get(routes::get_user).delete(routes::delete_user),
        )
        .route("/users/:user_id/update", post(routes::update_user))
        .route("/verify", post(routes::verify))
        .route("/identify", post(routes::identify))
        .route("/logs", get(routes::get_logs))
        .route("/challenge/generate", post(routes::generate_challenge))
        .route("/challenge/:challenge_id", get(routes::get_challenge))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
