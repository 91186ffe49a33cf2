use actix_web::{middleware, web, App, HttpServer};
use log::{error, info, warn};

use devbin::api;
use devbin::app_state::AppState;
use devbin::config::AppConfig;
use devbin::logging::init_logging;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::other(format!("invalid configuration: {}", e)))?;
    init_logging(&config.logging.config_file);

    let state = AppState::from_config(config)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to start: {}", e)))?;

    if let Err(e) = state.active_pastes.refresh(state.repository.as_ref()).await {
        warn!("Could not seed active pastes gauge: {}", e);
    }

    let cleanup = if state.config.cleanup.enabled {
        Some(state.cleanup_worker().start())
    } else {
        info!("Cleanup worker disabled");
        None
    };

    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let workers = state.config.server.workers.max(1);
    let payload_limit = state.config.server.max_payload_size;
    info!("Starting server on {}:{}", host, port);

    let data = web::Data::new(state);
    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .app_data(api::json_config(payload_limit))
            .configure(api::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await;

    if let Some(handle) = cleanup {
        handle.stop().await;
    }
    if let Err(e) = &result {
        error!("Server exited with error: {}", e);
    }
    info!("Server stopped");
    result
}
