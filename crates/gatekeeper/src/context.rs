//! Request-scoped authentication context.
//!
//! The auth gate stores a [`RequestContext`] in the request extensions and
//! the claims projector replaces it with a derived one. Handlers receive it
//! as an extractor; requests that were never authenticated (public paths,
//! OIDC disabled) see an empty context.

use crate::auth::claims::{ClaimValue, VerifiedToken};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

/// Context key the `sub` claim is projected to by
/// [`ClaimMapping::user_subject`](crate::auth::projector::ClaimMapping::user_subject).
pub const CTX_USER_KEY: &str = "user";

/// Authentication state carried with one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    token: Option<Arc<VerifiedToken>>,
    values: BTreeMap<String, ClaimValue>,
}

impl RequestContext {
    /// Context for a request that passed the auth gate.
    pub fn verified(token: VerifiedToken) -> Self {
        Self {
            token: Some(Arc::new(token)),
            values: BTreeMap::new(),
        }
    }

    /// The verified token, absent for exempt or unauthenticated requests.
    pub fn token(&self) -> Option<&VerifiedToken> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// A projected claim value.
    pub fn value(&self, key: &str) -> Option<&ClaimValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<String, ClaimValue> {
        &self.values
    }

    /// Projected `user` value, when the subject mapping is configured.
    pub fn user(&self) -> Option<&str> {
        self.value(CTX_USER_KEY).and_then(ClaimValue::as_str)
    }

    /// Copy of this context with `values` added.
    pub(crate) fn with_values(&self, values: BTreeMap<String, ClaimValue>) -> Self {
        let mut derived = self.clone();
        derived.values.extend(values);
        derived
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
