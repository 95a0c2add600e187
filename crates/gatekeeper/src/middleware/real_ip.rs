//! Client address resolution behind proxies.
//!
//! `True-Client-IP`, then `X-Real-IP`, then the first `X-Forwarded-For`
//! entry override the peer address. The result is stored as a
//! [`ClientAddr`] extension and used by the request logger.

use axum::{
    extract::{ConnectInfo, Request},
    http::{Extensions, HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};

static TRUE_CLIENT_IP: HeaderName = HeaderName::from_static("true-client-ip");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Address of the client as seen after proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

/// Client IP from proxy headers, if any carries a valid address.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_value = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let candidate = header_value(&TRUE_CLIENT_IP)
        .or_else(|| header_value(&X_REAL_IP))
        .or_else(|| {
            header_value(&X_FORWARDED_FOR)
                .and_then(|xff| xff.split(',').next())
                .map(str::trim)
        })?;

    candidate.parse().ok()
}

/// Best known client address: [`ClientAddr`] if set, else the peer address.
pub fn client_addr(extensions: &Extensions) -> Option<String> {
    if let Some(ClientAddr(addr)) = extensions.get::<ClientAddr>() {
        return Some(addr.clone());
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

pub async fn real_ip(mut req: Request, next: Next) -> Response {
    if let Some(ip) = forwarded_ip(req.headers()) {
        req.extensions_mut().insert(ClientAddr(ip.to_string()));
    }
    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_header_precedence() {
        let all = headers(&[
            ("true-client-ip", "203.0.113.1"),
            ("x-real-ip", "203.0.113.2"),
            ("x-forwarded-for", "203.0.113.3"),
        ]);
        assert_eq!(forwarded_ip(&all), Some("203.0.113.1".parse().unwrap()));

        let real = headers(&[("x-real-ip", "203.0.113.2"), ("x-forwarded-for", "203.0.113.3")]);
        assert_eq!(forwarded_ip(&real), Some("203.0.113.2".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_for_uses_first_entry() {
        let xff = headers(&[("x-forwarded-for", "198.51.100.7, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(forwarded_ip(&xff), Some("198.51.100.7".parse().unwrap()));

        let ipv6 = headers(&[("x-forwarded-for", "2001:db8::1")]);
        assert_eq!(forwarded_ip(&ipv6), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_or_missing_ip_is_ignored() {
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
        assert_eq!(forwarded_ip(&headers(&[("x-real-ip", "not-an-ip")])), None);
    }

    #[test]
    fn test_client_addr_prefers_forwarded_value() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo("127.0.0.1:5000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_addr(&extensions).as_deref(), Some("127.0.0.1:5000"));

        extensions.insert(ClientAddr("203.0.113.9".to_string()));
        assert_eq!(client_addr(&extensions).as_deref(), Some("203.0.113.9"));
    }
}
