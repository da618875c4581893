//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use dombind_core::{EventMessage, PatchOutcome};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print an outbound event message
    pub fn print_event(&self, message: &EventMessage) {
        match self.format {
            OutputFormat::Human => {
                let value = message
                    .value
                    .as_ref()
                    .map(|v| format!(" = {}", v))
                    .unwrap_or_default();
                println!("-> {} {}{}", message.reference, message.name, value);
            }
            OutputFormat::Json => match message.encode() {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode event: {}", e),
            },
            OutputFormat::Quiet => {}
        }
    }

    /// Print what one applied change did
    pub fn print_outcome(&self, line: usize, outcome: Option<&PatchOutcome>) {
        if !matches!(self.format, OutputFormat::Human) {
            return;
        }
        match outcome {
            Some(outcome) => println!("[{}] {}", line, describe(outcome)),
            None => println!("[{}] skipped", line),
        }
    }

    /// Print serialized markup
    pub fn print_html(&self, html: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "html": html })),
            OutputFormat::Human | OutputFormat::Quiet => println!("{}", html),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One-line summary of a patch outcome
fn describe(outcome: &PatchOutcome) -> String {
    match outcome {
        PatchOutcome::Refreshed {
            detached, attached, ..
        } => format!("refreshed ({} unbound, {} bound)", detached, attached),
        PatchOutcome::Triggered { effect, .. } => format!("triggered {}", effect.name),
        PatchOutcome::Updated { .. } => "updated".to_string(),
        PatchOutcome::Added { inserted, .. } => format!("added {} node(s)", inserted.len()),
        PatchOutcome::Removed { .. } => "removed".to_string(),
        PatchOutcome::Ignored { kind } => format!("ignored unknown type '{}'", kind),
    }
}
