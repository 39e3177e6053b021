use core::time::Duration;

use async_trait::async_trait;

use crate::{ProviderResult, Response, SynthesisRequest, TaskKind};

/// Uniform wrapper around one AI backend.
///
/// Implementations perform exactly one outbound call per [`Provider::invoke`]
/// and never retry internally; retry and fallback belong to the router.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn id(&self) -> &str;

    /// Task kinds this provider can serve.
    fn capabilities(&self) -> &[TaskKind];

    /// Whether this provider can serve `kind`.
    fn supports(&self, kind: TaskKind) -> bool {
        self.capabilities().contains(&kind)
    }

    /// True for the degraded-mode generator, whose output is never cached
    /// and never affects provider health.
    fn is_degraded(&self) -> bool {
        false
    }

    /// Executes the request against the backend.
    ///
    /// # Errors
    ///
    /// Returns a classified [`crate::ProviderError`] when the call fails or
    /// does not complete within `timeout`.
    async fn invoke(&self, request: &SynthesisRequest, timeout: Duration)
    -> ProviderResult<Response>;
}
