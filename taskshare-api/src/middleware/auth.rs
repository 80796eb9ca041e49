/// Session authentication middleware
///
/// Reads `Authorization: Bearer <token>`, resolves the token to a user id
/// through the account service and inserts an [`AuthContext`] into the
/// request extensions. Requests without a valid session are rejected with
/// 401 before reaching a handler.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use taskshare_api::middleware::auth::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}", auth.user_id)
/// }
/// ```
use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resolved user id (`user:<uuid>`)
    pub user_id: String,

    /// The bearer token the request presented
    pub token: String,
}

/// Extracts the bearer token from the Authorization header
///
/// # Errors
///
/// `Unauthorized` when the header is missing, `BadRequest` when it is not
/// a Bearer credential.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?.to_string();

    let user_id = state.accounts.resolve(&token).await?.ok_or_else(|| {
        tracing::debug!("Rejected request with unknown session");
        ApiError::Unauthorized("Invalid or expired session".to_string())
    })?;

    req.extensions_mut().insert(AuthContext { user_id, token });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            bearer_token(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(ApiError::BadRequest(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }
}
