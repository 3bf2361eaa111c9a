// caseboard-server main.rs
// HTTP API for the collaborative investigation coordination engine.

use std::path::PathBuf;
use std::sync::Arc;

use caseboard_server::{build_router, AppState};
use caseboard_session::{MemoryPressure, PresenceSweeper, SessionBootstrapper};
use caseboard_store::Database;
use tokio::time::Duration;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let port: u16 = arg_value(&args, "--port", "-p")
        .and_then(|s| s.parse().ok())
        .or_else(|| env_parse("CASEBOARD_PORT"))
        .unwrap_or(3000);

    let data_dir: PathBuf = arg_value(&args, "--data-dir", "-d")
        .map(PathBuf::from)
        .or_else(|| std::env::var("CASEBOARD_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("caseboard")
        });
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let relay_addr = std::env::var("CASEBOARD_RELAY_ADDR").ok();
    let bootstrap_deadline =
        Duration::from_millis(env_parse("CASEBOARD_BOOTSTRAP_DEADLINE_MS").unwrap_or(3000));
    let sweep_interval =
        Duration::from_secs(env_parse("CASEBOARD_SWEEP_INTERVAL_SECS").unwrap_or(30));
    let stale_threshold =
        chrono::Duration::seconds(env_parse("CASEBOARD_STALE_THRESHOLD_SECS").unwrap_or(120));

    let db_path = data_dir.join("caseboard.db");
    tracing::info!("Database: {:?}", db_path);
    tracing::info!("Port: {}", port);

    let db = Arc::new(Database::open(&db_path).expect("Failed to open database"));

    // The collaboration channel boots concurrently with the data layer; no
    // data API call ever waits on it. Degraded just means no live push yet.
    let pressure = MemoryPressure::new();
    let bootstrapper = Arc::new(SessionBootstrapper::new(bootstrap_deadline, pressure.clone()));
    {
        let bootstrapper = Arc::clone(&bootstrapper);
        tokio::spawn(async move {
            bootstrapper.start(init_collab_channel(relay_addr)).await;
        });
    }

    let sweeper = PresenceSweeper::spawn(
        Arc::clone(&db),
        sweep_interval,
        stale_threshold,
        pressure.clone(),
    );

    let state = Arc::new(AppState {
        db,
        bootstrapper,
        start_time: chrono::Utc::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state).layer(cors);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Caseboard coordination engine running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Session teardown: the background sweep never outlives the server.
    sweeper.shutdown().await;
}

/// Real collaboration-channel initialization: reach the relay, retrying until
/// it answers. The bootstrap race decides how long the caller waits on this.
async fn init_collab_channel(relay_addr: Option<String>) -> Result<(), String> {
    let Some(addr) = relay_addr else {
        return Err("collaboration relay not configured".to_string());
    };

    loop {
        match tokio::net::TcpStream::connect(&addr).await {
            Ok(_stream) => {
                tracing::info!(relay = %addr, "collaboration relay reachable");
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(relay = %addr, error = %err, "relay connect failed; retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

fn arg_value(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");
    tracing::info!("Shutting down...");
}
