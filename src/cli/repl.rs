//! Line-based input for the interactive subcommands

use crate::agent::is_exit;
use crate::cli::output::Output;
use crate::types::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

/// What the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Line(String),
    /// Blank line, ask again
    Empty,
    /// Exit sentinel or end of input
    Quit,
}

pub struct Repl<R> {
    lines: Lines<R>,
    sentinels: Vec<String>,
}

impl Repl<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Repl<R> {
    /// Reader that quits on `exit`.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            sentinels: Vec::new(),
        }
    }

    /// Additional case-insensitive words that end the session.
    pub fn with_sentinel(mut self, word: &str) -> Self {
        self.sentinels.push(word.to_lowercase());
        self
    }

    /// Show `prompt` and read the next line.
    pub async fn read(&mut self, output: &Output, prompt: &str) -> Result<ReplInput> {
        output.prompt(prompt);
        let Some(line) = self.lines.next_line().await? else {
            return Ok(ReplInput::Quit);
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            Ok(ReplInput::Empty)
        } else if is_exit(trimmed) || self.sentinels.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
            Ok(ReplInput::Quit)
        } else {
            Ok(ReplInput::Line(trimmed.to_string()))
        }
    }
}
