//! Demo handlers registered by the `gatekeeper` binary.

use tracing::instrument;

/// Handler for GET /hello (protected unless listed in `PUBLIC_URL_PREFIXES`).
#[instrument(skip_all, name = "gk.handlers.hello")]
pub async fn hello_root() -> &'static str {
    "Hello root"
}

/// Handler for GET /public.
#[instrument(skip_all, name = "gk.handlers.hello_public")]
pub async fn hello_public() -> &'static str {
    "Hello public"
}
