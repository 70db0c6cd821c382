//! Tower layer that tags each request with the client's location
//!
//! The layer resolves the client address, writes the configured geo headers
//! plus [`GeoRecord`] and [`Resolution`] extensions onto the request, then always
//! calls the inner service. The response is never touched.

mod headers;

pub use headers::HeaderInjector;

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, Request},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use crate::config::Config;
use crate::geo::ip_extractor::{extract_client_ip, REAL_IP_HEADER};
use crate::geo::lookup::GeoDatabase;
use crate::geo::record::GeoRecord;
use crate::geo::resolver::{GeoResolver, Resolution};

struct GeoIpState {
    resolver: GeoResolver,
    injector: HeaderInjector,
    real_ip_header: HeaderName,
}

/// Layer producing [`GeoIpService`]s that share one resolver.
#[derive(Clone)]
pub struct GeoIpLayer {
    state: Arc<GeoIpState>,
}

impl GeoIpLayer {
    pub fn new(resolver: GeoResolver, config: &Config) -> Self {
        let real_ip_header = HeaderName::from_bytes(config.real_ip_header.trim().as_bytes())
            .unwrap_or_else(|e| {
                warn!(
                    name = %config.real_ip_header,
                    error = %e,
                    "Invalid real IP header name, using {}", REAL_IP_HEADER
                );
                HeaderName::from_static(REAL_IP_HEADER)
            });

        Self {
            state: Arc::new(GeoIpState {
                resolver,
                injector: HeaderInjector::new(&config.headers),
                real_ip_header,
            }),
        }
    }

    /// Build a resolver from `config` around a (possibly shared) database handle.
    pub fn from_config(config: &Config, database: Option<GeoDatabase>) -> Self {
        Self::new(GeoResolver::from_config(config, database), config)
    }

    pub fn resolver(&self) -> &GeoResolver {
        &self.state.resolver
    }

    /// Names of the headers this layer writes.
    pub fn header_names(&self) -> impl Iterator<Item = &HeaderName> {
        self.state.injector.header_names()
    }
}

impl<S> Layer<S> for GeoIpLayer {
    type Service = GeoIpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GeoIpService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone)]
pub struct GeoIpService<S> {
    inner: S,
    state: Arc<GeoIpState>,
}

impl<S> GeoIpService<S> {
    fn tag<B>(&self, req: &mut Request<B>) {
        let peer_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let client_ip = extract_client_ip(req.headers(), &self.state.real_ip_header, &peer_addr);
        let resolution = self.state.resolver.resolve(&client_ip);

        self.state
            .injector
            .inject(req.headers_mut(), &resolution.record);
        let extensions = req.extensions_mut();
        extensions.insert::<GeoRecord>(GeoRecord::clone(&resolution.record));
        extensions.insert::<Resolution>(resolution);
    }
}

impl<S, B> Service<Request<B>> for GeoIpService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        self.tag(&mut req);
        self.inner.call(req)
    }
}
