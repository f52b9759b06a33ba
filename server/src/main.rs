use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use rccar_server::config::ServerConfig;
use rccar_server::session::SessionManager;
use rccar_server::sim_loop::run_sim_loop;
use rccar_server::ws::{ws_handler, AppState};
use rccar_server::SharedWorld;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let profile = match config.load_profile() {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Cannot load profile: {}", e);
            std::process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&profile) {
        Ok(json) => tracing::info!("Effective profile:\n{}", json),
        Err(e) => tracing::warn!("Could not render profile: {}", e),
    }

    let world: SharedWorld = Arc::new(Mutex::new(SessionManager::new(
        Arc::new(profile),
        config.session_timeout,
    )));

    // Spawn simulation loop
    let sim_world = world.clone();
    let sim_config = config.clone();
    tokio::spawn(async move {
        run_sim_loop(sim_world, sim_config).await;
    });

    // Axum app
    let app_state = AppState { world };
    let mut app = Router::new().route("/ws", get(ws_handler));
    if let Some(assets) = &config.assets_dir {
        tracing::info!("Serving client assets from {}", assets.display());
        app = app.fallback_service(ServeDir::new(assets));
    }
    let app = app.layer(CorsLayer::permissive()).with_state(app_state);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Cannot bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        tick_rate_hz = config.tick_rate_hz,
        timeout = ?config.session_timeout,
        "Starting RC car server on {}",
        config.listen_addr
    );
    println!("RC car server listening on {}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
