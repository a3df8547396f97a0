//! Request extractors shared by the handlers and middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Json, Query, Request},
    http::{HeaderMap, request::Parts},
};
use serde::de::DeserializeOwned;

use mediator_types::{AppError, ProviderGateway, Repository, User};

use super::handlers::{ApiError, AppState};
use crate::Caller;

/// The user resolved by the auth middleware, stored in request extensions.
#[derive(Debug, Clone)]
pub(crate) struct AuthenticatedUser(pub User);

/// Why a non-public request could not be authenticated. Answered with 401 by
/// [`super::auth::require_auth`] once the request has been rate limited.
#[derive(Debug, Clone)]
pub(crate) struct Unauthenticated(pub String);

/// Client address: first `X-Forwarded-For` entry, else the socket peer.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn peer_addr(parts: &Parts) -> Option<SocketAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client address of the request, if known.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(&parts.headers, peer_addr(parts))))
    }
}

impl<R: Repository, G: ProviderGateway> FromRequestParts<Arc<AppState<R, G>>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState<R, G>>,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|AuthenticatedUser(user)| user.clone())
            .ok_or_else(|| ApiError(AppError::Unauthorized("Authentication required".into())))?;
        Ok(Caller::new(user, client_ip(&parts.headers, peer_addr(parts))))
    }
}

/// JSON body extractor whose rejections use the API error shape.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| ApiError(AppError::BadRequest(rejection.body_text())))
    }
}

/// Query string extractor whose rejections use the API error shape.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection| ApiError(AppError::BadRequest(rejection.body_text())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(forwarded: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", forwarded.parse().unwrap());
        headers
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_entry() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        assert_eq!(
            client_ip(&headers("203.0.113.7, 10.0.0.1"), Some(peer)).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("10.0.0.9")
        );
        assert_eq!(client_ip(&headers(" "), None), None);
    }
}
