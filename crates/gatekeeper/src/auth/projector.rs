//! Claim-to-context projection.
//!
//! Copies configured claims of the verified token into the request context
//! under application-chosen keys. Either every mapping applies or the
//! request is rejected; handlers never see a partially projected context.

use crate::auth::claims::{ClaimValue, CLAIM_USER_KEY};
use crate::context::{RequestContext, CTX_USER_KEY};
use crate::errors::AuthError;
use std::collections::BTreeMap;

/// Ordered claim name → context key pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimMapping {
    entries: Vec<(String, String)>,
}

impl ClaimMapping {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Projects `sub` into the `user` context key.
    pub fn user_subject() -> Self {
        Self::new([(CLAIM_USER_KEY.to_string(), CTX_USER_KEY.to_string())])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Derive the projected context for `ctx`.
    ///
    /// Contexts without a verified token, and empty mappings, pass through
    /// unchanged.
    ///
    /// # Errors
    ///
    /// `AuthError::MissingClaim` naming the first configured claim that is
    /// absent from the token.
    pub fn project(&self, ctx: &RequestContext) -> Result<RequestContext, AuthError> {
        let Some(token) = ctx.token() else {
            return Ok(ctx.clone());
        };
        if self.is_empty() {
            return Ok(ctx.clone());
        }

        let mut values: BTreeMap<String, ClaimValue> = BTreeMap::new();
        for (claim, key) in &self.entries {
            let value = token
                .claim(claim)
                .ok_or_else(|| AuthError::MissingClaim(claim.clone()))?;
            values.insert(key.clone(), value.clone());
        }

        Ok(ctx.with_values(values))
    }
}
