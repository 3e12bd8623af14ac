//! Request metadata extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

/// Client address and user agent, for logs and handshake diagnostics.
///
/// The address is the first `X-Forwarded-For` hop when present, else the
/// peer address if the server was started with connect info, else empty.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> ClientInfo {
        let (mut parts, _) = req.into_parts();
        ClientInfo::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn prefers_first_forwarded_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "curl/8")
            .body(())
            .unwrap();
        let info = extract(req).await;
        assert_eq!(info.ip, "203.0.113.7");
        assert_eq!(info.user_agent, "curl/8");
    }

    #[tokio::test]
    async fn falls_back_to_connect_info() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(extract(req).await.ip, "192.0.2.1");
    }

    #[tokio::test]
    async fn empty_when_unknown() {
        let info = extract(Request::builder().body(()).unwrap()).await;
        assert_eq!(info.ip, "");
        assert_eq!(info.user_agent, "");
    }
}
