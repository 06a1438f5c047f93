//! Colored output helpers for CLI

use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Horizontal rule between list entries
    pub fn separator(&self) {
        if self.colored {
            println!("  {}", "-".repeat(20).dimmed());
        } else {
            println!("  {}", "-".repeat(20));
        }
    }

    /// A labelled message in the conversation, e.g. `AI: ...`
    pub fn speaker(&self, who: &str, message: &str) {
        if self.colored {
            println!("{} {}", format!("{}:", who).cyan().bold(), message);
        } else {
            println!("{}: {}", who, message);
        }
    }

    /// One executed tool call
    pub fn tool_call(&self, name: &str, arguments: &str, result: &str) {
        if self.colored {
            println!(
                "  {} {}({}) {} {}",
                "⚙".magenta(),
                name.bright_white().bold(),
                arguments.dimmed(),
                "→".dimmed(),
                result.green()
            );
        } else {
            println!("  [TOOL] {}({}) -> {}", name, arguments, result);
        }
    }

    /// Print a streamed fragment without a trailing newline
    pub fn fragment(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    /// Print the input prompt and flush
    pub fn prompt(&self, message: &str) {
        if self.colored {
            print!("{} ", message.bright_white().bold());
        } else {
            print!("{} ", message);
        }
        let _ = io::stdout().flush();
    }
}
