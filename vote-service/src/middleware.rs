//! Middleware for handling IP injection

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Picks the client IP used for rate limiting: CF-Connecting-IP, then the
/// first X-Forwarded-For entry, then the socket peer. A socket-derived IP is
/// written back as X-Forwarded-For so the governor key extractor sees it.
pub async fn inject_client_ip(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let (ip, source) = match client_ip_from_headers(&req) {
        Some(found) => (Some(found.0), found.1),
        None => match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => {
                let ip = addr.ip().to_string();
                if let Ok(value) = HeaderValue::from_str(&ip) {
                    req.headers_mut().insert(X_FORWARDED_FOR, value);
                }
                (Some(ip), "socket")
            }
            None => (None, "unavailable"),
        },
    };

    match ip {
        Some(ip) => debug!("client_ip_source={} ip={}", source, ip),
        None => debug!("client_ip_source={}", source),
    }

    next.run(req).await
}

fn client_ip_from_headers<B>(req: &Request<B>) -> Option<(String, &'static str)> {
    let headers = req.headers();
    if let Some(ip) = headers
        .get(CF_CONNECTING_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some((ip.to_string(), "cf-connecting-ip"));
    }

    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|ip| (ip.to_string(), "x-forwarded-for"))
}
