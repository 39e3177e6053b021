//! Prompt templates shared by provider adapters.
//!
//! Each prompt file is a markdown document with Usage and Prompt sections.
//! Prompts are embedded at compile time using `include_str!`.

use crate::{EvidenceLevel, SynthesisOptions, SynthesisRequest, TaskKind};

// Embed prompt files at compile time
const SYNTHESIS_MD: &str = include_str!("../../../../prompts/synthesis.md");
const SIMPLE_QA_MD: &str = include_str!("../../../../prompts/simple_qa.md");
const COMPLEX_QA_MD: &str = include_str!("../../../../prompts/complex_qa.md");
const DOCUMENT_EXTRACTION_MD: &str = include_str!("../../../../prompts/document_extraction.md");

/// System prompt for a task kind.
#[must_use]
pub fn system_prompt(kind: TaskKind) -> String {
    let content = match kind {
        TaskKind::Synthesis => SYNTHESIS_MD,
        TaskKind::SimpleQa => SIMPLE_QA_MD,
        TaskKind::ComplexQa => COMPLEX_QA_MD,
        TaskKind::DocumentExtraction => DOCUMENT_EXTRACTION_MD,
    };

    extract_prompt_section(content).unwrap_or_else(|| content.trim().to_owned())
}

/// User message combining payload text, context, and option instructions.
#[must_use]
pub fn user_message(request: &SynthesisRequest) -> String {
    let mut message = request.payload.text.trim().to_owned();

    if let Some(context) = request
        .payload
        .context
        .as_deref()
        .map(str::trim)
        .filter(|context| !context.is_empty())
    {
        message.push_str("\n\nSupporting material:\n");
        message.push_str(context);
    }

    let instructions = option_instructions(&request.options);
    if !instructions.is_empty() {
        message.push_str("\n\nRequirements:\n");
        for instruction in instructions {
            message.push_str("- ");
            message.push_str(&instruction);
            message.push('\n');
        }
    }

    message
}

/// Rough output token budget derived from the target length.
#[must_use]
pub fn max_output_tokens(options: &SynthesisOptions, default_tokens: u32) -> u32 {
    // ~1.4 tokens per English word, with headroom for headings
    options
        .target_length
        .map_or(default_tokens, |words| words.saturating_mul(2).clamp(256, 16_000))
}

/// Renders the option set as plain-language instructions.
fn option_instructions(options: &SynthesisOptions) -> Vec<String> {
    let mut instructions = Vec::new();

    if let Some(words) = options.target_length {
        instructions.push(format!("Aim for roughly {words} words."));
    }
    if let Some(specialty) = options
        .specialty
        .as_deref()
        .map(str::trim)
        .filter(|specialty| !specialty.is_empty())
    {
        instructions.push(format!(
            "Write for a reader specialised in {specialty}; use its standard terminology."
        ));
    }
    match options.evidence_level {
        EvidenceLevel::Any => {}
        EvidenceLevel::Moderate => instructions
            .push("Support key claims with the sources they come from.".to_owned()),
        EvidenceLevel::Strong => instructions.push(
            "Include only well-established claims and cite a source for each one.".to_owned(),
        ),
    }

    instructions
}

/// Extracts the Prompt section from a markdown file
fn extract_prompt_section(content: &str) -> Option<String> {
    let prompt_start = content.find("## Prompt")?;
    let body_start = content[prompt_start..].find('\n')? + prompt_start + 1;

    // ## Prompt is always the last section
    let body = content[body_start..].trim();
    (!body.is_empty()).then(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prompt_section() {
        let markdown = "# Test\n\n## Usage\n\nUsage info.\n\n## Prompt\nDo the thing.\n";
        assert_eq!(
            extract_prompt_section(markdown).as_deref(),
            Some("Do the thing.")
        );
        assert!(extract_prompt_section("# No prompt here").is_none());
    }

    #[test]
    fn test_every_kind_has_prompt() {
        for kind in TaskKind::all() {
            let prompt = system_prompt(kind);
            assert!(!prompt.is_empty());
            assert!(!prompt.contains("## Usage"), "{kind} prompt leaked usage");
        }
    }

    #[test]
    fn test_user_message_includes_requirements() {
        let request = SynthesisRequest::synthesis("  sepsis management ")
            .with_context("Excerpt: early antibiotics")
            .with_target_length(500)
            .with_specialty("critical care")
            .with_evidence_level(EvidenceLevel::Strong);

        let message = user_message(&request);
        assert!(message.starts_with("sepsis management"));
        assert!(message.contains("Supporting material:\nExcerpt: early antibiotics"));
        assert!(message.contains("roughly 500 words"));
        assert!(message.contains("critical care"));
        assert!(message.contains("cite a source"));
    }

    #[test]
    fn test_plain_question_has_no_requirements() {
        let request = SynthesisRequest::new(TaskKind::SimpleQa, "What is HbA1c?");
        assert_eq!(user_message(&request), "What is HbA1c?");
    }

    #[test]
    fn test_max_output_tokens() {
        let mut options = SynthesisOptions::default();
        assert_eq!(max_output_tokens(&options, 4096), 4096);
        options.target_length = Some(50);
        assert_eq!(max_output_tokens(&options, 4096), 256);
        options.target_length = Some(1000);
        assert_eq!(max_output_tokens(&options, 4096), 2000);
    }
}
