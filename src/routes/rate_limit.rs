use axum::http::Request;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

/// Per-client key for the API rate limiter.
///
/// Behind a reverse proxy the client address comes from `X-Forwarded-For`
/// (first hop) or `X-Real-IP`; otherwise the peer address is used. Requests
/// with no identifiable address share one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackIpKeyExtractor;

fn forwarded_ip<T>(req: &Request<T>) -> Option<IpAddr> {
    let xff = req.headers().get("x-forwarded-for")?.to_str().ok()?;
    xff.split(',').next()?.trim().parse().ok()
}

fn real_ip<T>(req: &Request<T>) -> Option<IpAddr> {
    req.headers().get("x-real-ip")?.to_str().ok()?.trim().parse().ok()
}

impl KeyExtractor for FallbackIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = || {
            req.extensions()
                .get::<axum::extract::ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        };

        Ok(forwarded_ip(req)
            .or_else(|| real_ip(req))
            .or_else(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)))
    }
}
