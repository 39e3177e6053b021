//! Degraded-mode placeholder generator.
//!
//! Always last in every candidate list. It never fails, never consumes quota,
//! and labels its output so no reader mistakes it for model-generated text.

use core::time::Duration;

use async_trait::async_trait;
use quill_core::{Provider, ProviderResult, Response, SynthesisRequest, TaskKind, TokenUsage};

/// Banner opening every degraded result.
pub const DEGRADED_BANNER: &str = "[DEGRADED RESULT] No AI provider was available to serve this \
     request. The text below is a structural placeholder, not model output, and makes no \
     factual claims.";

/// Longest topic excerpt echoed back in the placeholder title.
const TITLE_CHARS: usize = 80;

/// Placeholder provider used when every real provider failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

impl MockProvider {
    /// Registry identifier; also the `served_by` of degraded results.
    pub const ID: &'static str = "mock";

    /// Builds the placeholder response. Infallible.
    #[must_use]
    pub fn placeholder(&self, request: &SynthesisRequest) -> Response {
        let title = title_from(&request.payload.text);
        let body = match request.kind {
            TaskKind::Synthesis => format!(
                "# {title}\n\n## Overview\n(unavailable)\n\n## Key Points\n(unavailable)\n\n\
                 ## Open Questions\n(unavailable)"
            ),
            TaskKind::SimpleQa | TaskKind::ComplexQa => {
                format!("Question: {title}\n\nAnswer: unavailable. Please retry later.")
            }
            TaskKind::DocumentExtraction => format!(
                "Document: {title}\n\nSections: (unavailable)\nFigures: (unavailable)"
            ),
        };

        Response {
            text: format!("{DEGRADED_BANNER}\n\n{body}"),
            provider: Self::ID.to_owned(),
            degraded: true,
            tokens_used: TokenUsage::default(),
            latency_ms: 0,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn capabilities(&self) -> &[TaskKind] {
        static ALL: [TaskKind; 4] = TaskKind::all();
        &ALL
    }

    fn is_degraded(&self) -> bool {
        true
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _timeout: Duration,
    ) -> ProviderResult<Response> {
        Ok(self.placeholder(request))
    }
}

/// First line of the payload, whitespace-collapsed and shortened.
fn title_from(text: &str) -> String {
    let first_line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "Untitled request".to_owned();
    }
    if collapsed.chars().count() > TITLE_CHARS {
        let shortened: String = collapsed.chars().take(TITLE_CHARS).collect();
        format!("{shortened}…")
    } else {
        collapsed
    }
}
