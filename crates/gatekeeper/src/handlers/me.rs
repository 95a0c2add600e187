//! Current user handler.
//!
//! Echoes what the auth gate and the claims projector put into the request
//! context: the verifying key ID and the projected values.

use crate::context::RequestContext;
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::instrument;

/// Response for the `/me` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    /// Whether the request carried a verified token.
    pub authenticated: bool,

    /// Key ID that verified the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Projected context values, keyed by context key.
    pub context: Map<String, Value>,
}

impl From<&RequestContext> for MeResponse {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            authenticated: ctx.is_authenticated(),
            kid: ctx.token().map(|token| token.kid().to_string()),
            context: ctx
                .values()
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        }
    }
}

/// Handler for GET /me
///
/// ## Response
///
/// ```json
/// {
///   "authenticated": true,
///   "kid": "test-key-01",
///   "context": {"user": "alice"}
/// }
/// ```
#[instrument(skip_all, name = "gk.handlers.me")]
pub async fn get_me(ctx: RequestContext) -> Json<MeResponse> {
    tracing::debug!(target: "gk.handlers.me", "Returning request context");
    Json(MeResponse::from(&ctx))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{ClaimMapping, Claims, VerifiedToken};
    use serde_json::json;

    #[test]
    fn test_me_response_for_projected_context() {
        let claims: Claims = serde_json::from_value(json!({"sub": "alice"})).unwrap();
        let ctx = RequestContext::verified(VerifiedToken::new("test-key-01".to_string(), claims));
        let ctx = ClaimMapping::user_subject().project(&ctx).unwrap();

        let json = serde_json::to_value(MeResponse::from(&ctx)).unwrap();

        assert_eq!(
            json,
            json!({
                "authenticated": true,
                "kid": "test-key-01",
                "context": {"user": "alice"}
            })
        );
    }

    #[test]
    fn test_me_response_without_token() {
        let json = serde_json::to_string(&MeResponse::from(&RequestContext::default())).unwrap();

        assert!(json.contains("\"authenticated\":false"));
        assert!(!json.contains("kid"), "kid should be omitted when None");
    }
}
