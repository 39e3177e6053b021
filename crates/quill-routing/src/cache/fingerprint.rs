//! Stable request fingerprints.

use core::fmt::{Display, Formatter, Result as FmtResult};

use quill_core::SynthesisRequest;
use sha2::{Digest as _, Sha256};

/// Hex SHA-256 fingerprint of a request.
///
/// Two requests that differ only in surrounding or repeated whitespace, or in
/// the case of the specialty tag, share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for `request`.
    #[must_use]
    pub fn for_request(request: &SynthesisRequest) -> Self {
        let mut hasher = Sha256::new();
        // Each field is prefixed with its byte length so no content can shift a boundary.
        let mut field = |value: &str| {
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };

        field(request.kind.as_str());
        field(&collapse_whitespace(&request.payload.text));
        field(
            &request
                .payload
                .context
                .as_deref()
                .map(collapse_whitespace)
                .unwrap_or_default(),
        );
        let length = request
            .options
            .target_length
            .map(|words| words.to_string())
            .unwrap_or_default();
        field(&length);
        let specialty = request
            .options
            .specialty
            .as_deref()
            .map(|tag| tag.trim().to_lowercase())
            .unwrap_or_default();
        field(&specialty);
        field(request.options.evidence_level.as_str());

        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str(&self.0)
    }
}

/// Trims and collapses every whitespace run to a single space.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
