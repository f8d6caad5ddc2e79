//! Response generation capability.
//!
//! The generator is a per-call stateless adapter: it receives the session's
//! generation context and returns one assistant reply or a classified
//! [`ProviderError`]. Concurrency gating (one generation at a time) is the
//! session controller's job, never the adapter's.

pub mod fallback;
pub mod gemini;

use crate::transcript::{Message, Role};
use async_trait::async_trait;

pub use gemini::GeminiGenerator;

/// Classified provider failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the call for quota reasons (HTTP 429).
    #[error("provider rate limited")]
    RateLimited,
    /// The call never produced a usable response (network, timeout, 5xx).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The provider answered but the payload had no reply in it.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Reply-producing capability.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate one assistant reply for the given ordered context.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] classifying the failure; the session
    /// converts these into canned fallbacks, never transcript errors.
    async fn generate(&self, context: &[Message]) -> std::result::Result<String, ProviderError>;
}

/// Map a transcript role onto the provider's two-role schema.
///
/// The provider accepts only `user` and `model`. The remap is lossy and
/// deterministic: `system` annotations and anything unrecognized become
/// `user`, assistant turns become `model`.
#[must_use]
pub fn provider_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    }
}
