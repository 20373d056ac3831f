use backend::{app, AppState};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = if let Ok(path) = env::var("PERSIST_PATH") {
        tracing::info!("Persisting store snapshots to {path}");
        AppState::with_persistence(path).await
    } else {
        tracing::info!("No PERSIST_PATH set, running with an in-memory store");
        AppState::in_memory()
    };

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let app = app(state);
    tracing::info!("Starting server on {bind_addr}");
    axum::serve(
        tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("bind"),
        app,
    )
    .await
    .expect("server error");
}
