mod auth;
mod config;
mod db;
mod projects;
mod routes;
mod state;
mod tasks;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use ws::rooms::RoomRegistry;

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "boardsync_server=info".parse().unwrap());

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    init_tracing(config.json_logs);
    tracing::info!("boardsync server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let app = routes::build_router(state::AppState {
        db,
        jwt_secret,
        rooms: Arc::new(RoomRegistry::new()),
        cors_origin: config.cors_origin.clone(),
    });

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
