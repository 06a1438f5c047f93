//! CLI module for reviewrag
//!
//! Argument parsing with clap and colored terminal output with owo-colors.
//! Each subcommand is handled in [`commands`].

pub mod commands;
pub mod output;
pub mod repl;

use crate::utils::toml_config::ProviderKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// reviewrag - LLM agent, chat and review question answering
#[derive(Parser, Debug)]
#[command(
    name = "reviewrag",
    version,
    about = "Tool-calling agent, chat REPL and RAG over restaurant reviews",
    long_about = "Small LLM toolkit: a Gemini tool-calling agent with arithmetic tools, a chat REPL,\n\
                  and a local RAG pipeline that answers questions about restaurant reviews\n\
                  using Ollama embeddings and an embedded vector store.",
    after_help = "EXAMPLES:\n    \
                  reviewrag agent                        # Run the default arithmetic prompt\n    \
                  reviewrag chat                         # Talk to the chat model, 'exit' to quit\n    \
                  reviewrag ingest --csv reviews.csv     # Build the review store once\n    \
                  reviewrag ask \"how is the crust?\"      # Answer one question\n    \
                  reviewrag models                       # List Gemini models"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "reviewrag.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tool-calling agent on a single prompt
    Agent {
        /// Prompt to send; defaults to `[agent].default_prompt`
        prompt: Option<String>,

        /// Override `[agent].max_iterations`
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Interactive chat with in-memory history
    Chat,

    /// Answer questions about the reviews, interactively if no question is given
    ///
    /// The review store is populated from the CSV first if it is empty.
    Ask {
        /// Single question to answer
        question: Option<String>,
    },

    /// List models available to the configured credential
    Models {
        /// Provider to query (gemini or ollama)
        #[arg(long, default_value = "gemini")]
        provider: ProviderKind,
    },

    /// Load the review CSV into the vector store if it is empty
    Ingest {
        /// Override `[rag].csv_path`
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_agent_with_overrides() {
        let cli = Cli::try_parse_from(["reviewrag", "--no-color", "agent", "2+2?", "--max-iterations", "3"]).unwrap();
        assert!(cli.no_color);
        assert_eq!(cli.config, PathBuf::from("reviewrag.toml"));
        match cli.command {
            Commands::Agent { prompt, max_iterations } => {
                assert_eq!(prompt.as_deref(), Some("2+2?"));
                assert_eq!(max_iterations, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_models_provider() {
        let cli = Cli::try_parse_from(["reviewrag", "models", "--provider", "ollama", "-c", "alt.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Commands::Models { provider: ProviderKind::Ollama }));

        let cli = Cli::try_parse_from(["reviewrag", "models"]).unwrap();
        assert!(matches!(cli.command, Commands::Models { provider: ProviderKind::Gemini }));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["reviewrag", "models", "--provider", "openai"]).is_err());
    }
}
