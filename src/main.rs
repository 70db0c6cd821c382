use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName},
    routing::get,
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geotag::config::Config;
use geotag::geo::{GeoDatabase, Resolution};
use geotag::GeoIpLayer;

/// Echo what the geo layer attached to the request
async fn whereami(
    State(names): State<Arc<Vec<HeaderName>>>,
    Extension(resolution): Extension<Resolution>,
    headers: HeaderMap,
) -> Json<Value> {
    let geo_headers: serde_json::Map<String, Value> = names
        .iter()
        .filter_map(|name| {
            let value = headers.get(name)?;
            Some((
                name.to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            ))
        })
        .collect();

    Json(json!({
        "source": resolution.source,
        "record": &*resolution.record,
        "headers": geo_headers,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Opened once and shared by every layer built from it
    let database = GeoDatabase::open_or_disable(&config.database_path);
    let geo_layer = GeoIpLayer::from_config(&config, database);

    if geo_layer.resolver().has_database() {
        info!("🌍 GeoIP database: {}", config.database_path);
    } else {
        info!("🌍 Running without GeoIP database (overrides and sentinel values only)");
    }

    let purger = geo_layer
        .resolver()
        .spawn_cache_purger(Duration::from_secs(config.cache.purge_interval_secs.max(1)));

    let geo_headers = Arc::new(geo_layer.header_names().cloned().collect::<Vec<_>>());

    let app = Router::new()
        .route("/", get(whereami))
        .with_state(geo_headers)
        .layer(geo_layer)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    purger.shutdown();
    Ok(())
}
