//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use quill_core::EvidenceLevel;

/// Command-line arguments for the quill CLI
#[derive(Debug, Parser)]
#[command(name = "quill")]
#[command(about = "Multi-provider AI synthesis with graceful degradation", long_about = None)]
pub struct Cli {
    /// Configuration file [default: ~/.quill/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log router metrics after the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Answer a question synchronously
    Ask {
        /// The question to answer
        question: String,

        /// Treat the question as requiring multi-step reasoning
        #[arg(long)]
        complex: bool,
    },

    /// Run a synthesis job and follow its progress
    Synthesize(SynthesizeArgs),

    /// Show configuration
    Config {
        /// Print the full TOML including defaults
        #[arg(long)]
        full: bool,
    },
}

/// Arguments of the `synthesize` subcommand
#[derive(Debug, Args)]
pub struct SynthesizeArgs {
    /// Topic to synthesize
    pub topic: String,

    /// File with supporting material
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Target length in words
    #[arg(short, long)]
    pub length: Option<u32>,

    /// Specialty tag, for example `cardiology`
    #[arg(short, long)]
    pub specialty: Option<String>,

    /// Required evidence standard
    #[arg(long, value_enum, default_value_t = EvidenceArg::Any)]
    pub evidence: EvidenceArg,
}

/// Evidence level as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvidenceArg {
    /// No particular requirement
    Any,
    /// Prefer cited sources
    Moderate,
    /// Only well-established claims
    Strong,
}

impl From<EvidenceArg> for EvidenceLevel {
    fn from(arg: EvidenceArg) -> Self {
        match arg {
            EvidenceArg::Any => Self::Any,
            EvidenceArg::Moderate => Self::Moderate,
            EvidenceArg::Strong => Self::Strong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["quill", "ask", "What is troponin?", "--complex"]);
        let Ok(cli) = cli else {
            panic!("ask should parse: {cli:?}");
        };
        assert!(!cli.metrics);
        assert!(matches!(
            cli.command,
            Commands::Ask { ref question, complex: true } if question == "What is troponin?"
        ));
    }

    #[test]
    fn test_parse_synthesize_options() {
        let cli = Cli::try_parse_from([
            "quill",
            "synthesize",
            "Heart failure",
            "--length",
            "800",
            "--specialty",
            "cardiology",
            "--evidence",
            "strong",
            "--metrics",
        ]);
        let Ok(cli) = cli else {
            panic!("synthesize should parse: {cli:?}");
        };
        assert!(cli.metrics);
        let Commands::Synthesize(args) = cli.command else {
            panic!("expected synthesize");
        };
        assert_eq!(args.topic, "Heart failure");
        assert_eq!(args.length, Some(800));
        assert_eq!(args.specialty.as_deref(), Some("cardiology"));
        assert_eq!(EvidenceLevel::from(args.evidence), EvidenceLevel::Strong);
        assert!(args.context.is_none());
    }

    #[test]
    fn test_evidence_defaults_to_any() {
        let cli = Cli::try_parse_from(["quill", "synthesize", "Sepsis"]);
        assert!(matches!(
            cli.map(|cli| cli.command),
            Ok(Commands::Synthesize(SynthesizeArgs {
                evidence: EvidenceArg::Any,
                ..
            }))
        ));
    }

    #[test]
    fn test_rejects_unknown_evidence() {
        assert!(Cli::try_parse_from(["quill", "synthesize", "Sepsis", "--evidence", "weak"]).is_err());
    }
}
