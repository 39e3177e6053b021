use core::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Category of AI work requested.
///
/// Drives provider ordering, cache partitioning and cache lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Long-form content synthesis.
    Synthesis,
    /// Short factual question.
    SimpleQa,
    /// Question requiring reasoning across sources.
    ComplexQa,
    /// Structured extraction from an ingested document.
    DocumentExtraction,
}

impl TaskKind {
    /// Every task kind, in declaration order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::Synthesis,
            Self::SimpleQa,
            Self::ComplexQa,
            Self::DocumentExtraction,
        ]
    }

    /// Stable snake-case identifier, also used in configuration keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synthesis => "synthesis",
            Self::SimpleQa => "simple_qa",
            Self::ComplexQa => "complex_qa",
            Self::DocumentExtraction => "document_extraction",
        }
    }

    /// Whether this kind may be answered synchronously.
    #[must_use]
    pub const fn is_question(self) -> bool {
        matches!(self, Self::SimpleQa | Self::ComplexQa)
    }
}

impl Display for TaskKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str(self.as_str())
    }
}

/// Evidence standard the caller expects the answer to meet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLevel {
    /// No particular requirement.
    #[default]
    Any,
    /// Claims should be backed by cited sources where possible.
    Moderate,
    /// Only well-established, citable claims.
    Strong,
}

impl EvidenceLevel {
    /// Stable snake-case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

/// Input text for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Topic, question, or document text.
    pub text: String,
    /// Optional supporting material (excerpts, prior chapters, references).
    pub context: Option<String>,
}

impl Payload {
    /// Creates a payload without supporting context.
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            context: None,
        }
    }
}

/// Provider-agnostic knobs shaping the generated output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Desired length in words.
    pub target_length: Option<u32>,
    /// Specialty tag (for example `cardiology`).
    pub specialty: Option<String>,
    /// Required evidence standard.
    pub evidence_level: EvidenceLevel,
}

/// A content-generation or question-answering request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// What kind of work is requested.
    pub kind: TaskKind,
    /// Input text.
    pub payload: Payload,
    /// Output shaping options.
    pub options: SynthesisOptions,
}

impl SynthesisRequest {
    /// Creates a request with default options.
    pub fn new<T: Into<String>>(kind: TaskKind, text: T) -> Self {
        Self {
            kind,
            payload: Payload::new(text),
            options: SynthesisOptions::default(),
        }
    }

    /// Creates a synthesis request for a topic.
    pub fn synthesis<T: Into<String>>(topic: T) -> Self {
        Self::new(TaskKind::Synthesis, topic)
    }

    /// Attaches supporting context to the payload.
    #[must_use]
    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.payload.context = Some(context.into());
        self
    }

    /// Replaces the option set.
    #[must_use]
    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the target length in words.
    #[must_use]
    pub fn with_target_length(mut self, words: u32) -> Self {
        self.options.target_length = Some(words);
        self
    }

    /// Sets the specialty tag.
    #[must_use]
    pub fn with_specialty<T: Into<String>>(mut self, specialty: T) -> Self {
        self.options.specialty = Some(specialty.into());
        self
    }

    /// Sets the required evidence level.
    #[must_use]
    pub fn with_evidence_level(mut self, level: EvidenceLevel) -> Self {
        self.options.evidence_level = level;
        self
    }
}

/// Output of one successful provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated text.
    pub text: String,
    /// Identifier of the provider that produced the text.
    pub provider: String,
    /// True when produced by the degraded-mode generator.
    pub degraded: bool,
    /// Token accounting reported by the provider.
    pub tokens_used: TokenUsage,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
}

impl TokenUsage {
    /// Sum of input and output tokens.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input + self.output
    }
}
