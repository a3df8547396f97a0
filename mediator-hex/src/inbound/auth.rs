//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use mediator_types::{AppError, ProviderGateway, Repository};

use super::extract::{AuthenticatedUser, Unauthenticated};
use super::handlers::{ApiError, AppState};

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
pub(crate) fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim_start();
    let key = match header.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => header.trim(),
    };
    (!key.is_empty()).then_some(key)
}

/// Paths served without an API key.
///
/// - `/health`, `/health/*` - Health checks
/// - `/swagger-ui`, `/api-docs` - API documentation
/// - `POST /api/v1/bootstrap` - Creates the first admin (only while no users exist)
/// - `POST /api/v1/webhooks/{provider_code}` - Authenticated by signature instead
fn is_public(method: &Method, path: &str) -> bool {
    if is_health(path) || path.starts_with("/swagger-ui") || path.starts_with("/api-docs") {
        return true;
    }
    method == Method::POST
        && (path == "/api/v1/bootstrap" || path.starts_with("/api/v1/webhooks/"))
}

pub(crate) fn is_health(path: &str) -> bool {
    path == "/health" || path.starts_with("/health/")
}

/// Authentication middleware that validates API keys.
///
/// Valid keys resolve to their (active) owner, which is stored in the
/// request extensions for the [`crate::Caller`] extractor and the rate
/// limiter. Missing or unknown keys are recorded as [`Unauthenticated`] and
/// the request continues, so the limiter counts it against the client
/// address before [`require_auth`] answers 401.
pub async fn auth_middleware<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let Some(api_key) = extract_api_key(auth_header) else {
        request.extensions_mut().insert(Unauthenticated(
            "Missing or invalid Authorization header".into(),
        ));
        return next.run(request).await;
    };

    match state.service.authenticate(api_key).await {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, "Authenticated request");
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
        Err(AppError::Unauthorized(reason)) => {
            request.extensions_mut().insert(Unauthenticated(reason));
        }
        Err(e) => return ApiError(e).into_response(),
    }
    next.run(request).await
}

/// Rejects requests the auth middleware could not authenticate.
pub async fn require_auth(request: Request<Body>, next: Next) -> Response {
    match request.extensions().get::<Unauthenticated>() {
        Some(Unauthenticated(reason)) => {
            ApiError(AppError::Unauthorized(reason.clone())).into_response()
        }
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer mk_test_123")),
            Some("mk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("mk_test_123")), Some("mk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
        assert_eq!(extract_api_key(Some("Bearer ")), None);
        assert_eq!(extract_api_key(Some("Bearer")), None);
        assert_eq!(extract_api_key(Some("  Bearer   ")), None);
        assert_eq!(extract_api_key(Some("")), None);
    }

    #[test]
    fn test_extract_api_key_extra_whitespace() {
        assert_eq!(
            extract_api_key(Some("Bearer   mk_test_123  ")),
            Some("mk_test_123")
        );
        assert_eq!(extract_api_key(Some("Bearer\tmk_test_123")), Some("mk_test_123"));
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::GET, "/health/queue"));
        assert!(is_public(&Method::POST, "/api/v1/bootstrap"));
        assert!(is_public(&Method::POST, "/api/v1/webhooks/esewa"));
        assert!(!is_public(&Method::GET, "/api/v1/bootstrap"));
        assert!(!is_public(&Method::GET, "/api/v1/users"));
        assert!(!is_public(&Method::GET, "/healthz"));
    }
}
