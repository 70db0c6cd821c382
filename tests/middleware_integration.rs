//! Geo layer integration tests
//!
//! These tests run the layer in front of a real axum router and check what the
//! downstream handler observes, without needing a MaxMind database.

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    routing::get,
    Extension, Json, Router,
};
use geotag::config::{Config, HeaderNames, LocationOverride};
use geotag::geo::{GeoDatabase, GeoRecord, Resolution, UNKNOWN};
use geotag::GeoIpLayer;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{Layer, ServiceExt};

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer(SocketAddr);

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware {
            inner,
            addr: self.0,
        }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

/// Handler that echoes the geo headers it received
async fn echo(
    Extension(resolution): Extension<Resolution>,
    headers: HeaderMap,
) -> Json<Value> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for (name, value) in headers.iter() {
        if name.as_str().starts_with("geoip_") {
            seen.insert(
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
    }

    Json(serde_json::json!({
        "source": resolution.source,
        "headers": seen,
    }))
}

fn munich_override(range: &str) -> LocationOverride {
    LocationOverride {
        ip_range: range.to_string(),
        country: "DE".to_string(),
        region: "BY".to_string(),
        city: "Munich".to_string(),
        ..Default::default()
    }
}

/// Config pointing at a database that does not exist
fn test_config(overrides: Vec<LocationOverride>) -> Config {
    Config {
        database_path: "./non-existing.mmdb".to_string(),
        location_overrides: overrides,
        ..Config::default()
    }
}

fn app(layer: GeoIpLayer, peer: &str) -> Router {
    Router::new()
        .route("/", get(echo))
        .layer(layer)
        .layer(TestConnectInfoLayer(peer.parse().unwrap()))
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get_root() -> Request<Body> {
    Request::builder().uri("/").body(Body::empty()).unwrap()
}

fn header<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body["headers"][name].as_str()
}

#[tokio::test]
async fn test_missing_database_still_forwards() {
    let config = test_config(vec![]);
    let database = GeoDatabase::open_or_disable(&config.database_path);
    assert!(database.is_none());

    let (status, body) = call(
        app(GeoIpLayer::from_config(&config, database), "188.193.88.199:9999"),
        get_root(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "unknown");
    for name in [
        "geoip_country",
        "geoip_region",
        "geoip_city",
        "geoip_latitude",
        "geoip_longitude",
    ] {
        assert_eq!(header(&body, name), Some(UNKNOWN), "header {name}");
    }
}

#[tokio::test]
async fn test_inner_service_is_always_called() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let router = Router::new()
        .route(
            "/",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }
            }),
        )
        .layer(GeoIpLayer::from_config(&test_config(vec![]), None));

    // No ConnectInfo at all: the peer address is empty
    let response = router.oneshot(get_root()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_override_from_remote_addr() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let (_, body) = call(
        app(GeoIpLayer::from_config(&config, None), "10.0.0.42:9999"),
        get_root(),
    )
    .await;

    assert_eq!(body["source"], "override");
    assert_eq!(header(&body, "geoip_country"), Some("DE"));
    assert_eq!(header(&body, "geoip_region"), Some("BY"));
    assert_eq!(header(&body, "geoip_city"), Some("Munich"));
    assert_eq!(header(&body, "geoip_latitude"), Some(UNKNOWN));
}

#[tokio::test]
async fn test_override_from_ipv6_remote_addr() {
    let config = test_config(vec![munich_override("fd00::/8")]);
    let (_, body) = call(
        app(GeoIpLayer::from_config(&config, None), "[fd00::42]:443"),
        get_root(),
    )
    .await;

    assert_eq!(header(&body, "geoip_city"), Some("Munich"));
}

#[tokio::test]
async fn test_real_ip_header_takes_precedence() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let request = Request::builder()
        .uri("/")
        .header("X-Real-IP", "10.1.2.3")
        .body(Body::empty())
        .unwrap();

    let (_, body) = call(
        app(GeoIpLayer::from_config(&config, None), "203.0.113.9:9999"),
        request,
    )
    .await;

    assert_eq!(header(&body, "geoip_city"), Some("Munich"));
}

#[tokio::test]
async fn test_unparseable_address_is_unknown() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let request = Request::builder()
        .uri("/")
        .header("X-Real-IP", "qwerty")
        .body(Body::empty())
        .unwrap();

    let (status, body) = call(
        app(GeoIpLayer::from_config(&config, None), "10.0.0.42:9999"),
        request,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&body, "geoip_country"), Some(UNKNOWN));
    assert_eq!(header(&body, "geoip_region"), Some(UNKNOWN));
    assert_eq!(header(&body, "geoip_city"), Some(UNKNOWN));
}

#[tokio::test]
async fn test_opaque_real_ip_header_does_not_fall_back_to_peer() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let request = Request::builder()
        .uri("/")
        .header("X-Real-IP", HeaderValue::from_bytes(b"\xffgarbage").unwrap())
        .body(Body::empty())
        .unwrap();

    let (status, body) = call(
        app(GeoIpLayer::from_config(&config, None), "10.0.0.42:9999"),
        request,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "unknown");
    assert_eq!(header(&body, "geoip_country"), Some(UNKNOWN));
    assert_eq!(header(&body, "geoip_city"), Some(UNKNOWN));
}

#[tokio::test]
async fn test_record_extension_matches_headers() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let router = Router::new()
        .route(
            "/",
            get(|Extension(record): Extension<GeoRecord>| async move {
                Json(serde_json::to_value(record).unwrap())
            }),
        )
        .layer(GeoIpLayer::from_config(&config, None))
        .layer(TestConnectInfoLayer("10.0.0.42:9999".parse().unwrap()));

    let (status, body) = call(router, get_root()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["country"], "DE");
    assert_eq!(body["region"], "BY");
    assert_eq!(body["city"], "Munich");
    assert_eq!(body["latitude"], UNKNOWN);
}

#[tokio::test]
async fn test_invalid_override_disables_table() {
    let config = test_config(vec![
        munich_override("10.0.0.0/8"),
        munich_override("10.0.0.0/99"),
    ]);
    let layer = GeoIpLayer::from_config(&config, None);
    assert!(layer.resolver().overrides().is_empty());

    let (status, body) = call(app(layer, "10.0.0.42:9999"), get_root()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&body, "geoip_country"), Some(UNKNOWN));
}

#[tokio::test]
async fn test_opted_out_headers_are_not_emitted() {
    let mut config = test_config(vec![munich_override("10.0.0.0/8")]);
    config.headers = HeaderNames {
        latitude: String::new(),
        longitude: String::new(),
        ..HeaderNames::default()
    };

    let (_, body) = call(
        app(GeoIpLayer::from_config(&config, None), "10.0.0.42:9999"),
        get_root(),
    )
    .await;

    assert_eq!(header(&body, "geoip_city"), Some("Munich"));
    assert!(header(&body, "geoip_latitude").is_none());
    assert!(header(&body, "geoip_longitude").is_none());
}

#[tokio::test]
async fn test_client_cannot_spoof_geo_headers() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let request = Request::builder()
        .uri("/")
        .header("Geoip_Country", "US")
        .body(Body::empty())
        .unwrap();

    let (_, body) = call(
        app(GeoIpLayer::from_config(&config, None), "10.0.0.42:9999"),
        request,
    )
    .await;

    assert_eq!(header(&body, "geoip_country"), Some("DE"));
}

#[tokio::test]
async fn test_repeated_requests_hit_cache() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let layer = GeoIpLayer::from_config(&config, None);

    let (_, first) = call(app(layer.clone(), "10.0.0.42:1111"), get_root()).await;
    let (_, second) = call(app(layer, "10.0.0.42:2222"), get_root()).await;

    assert_eq!(first["source"], "override");
    assert_eq!(second["source"], "cache");
    assert_eq!(first["headers"], second["headers"]);
}

#[tokio::test]
async fn test_concurrent_requests() {
    let config = test_config(vec![munich_override("10.0.0.0/8")]);
    let layer = GeoIpLayer::from_config(&config, None);

    let mut handles = Vec::new();
    for i in 0..50 {
        let router = app(layer.clone(), &format!("10.0.{}.{}:9999", i % 5, i));
        handles.push(tokio::spawn(async move { call(router, get_root()).await }));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(header(&body, "geoip_city"), Some("Munich"));
        assert_ne!(body["source"], "unknown");
    }
}
