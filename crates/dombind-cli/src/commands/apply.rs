//! Apply command handler
//!
//! Replays a JSON-lines stream of change messages against a page without a
//! server and prints the resulting markup.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use dombind_core::{Document, EventMessage, SyncEngine};

use crate::output::Output;

/// Apply changes from a file, or stdin when none is given
pub fn apply(page: PathBuf, changes: Option<PathBuf>, output: &Output) -> Result<()> {
    let html = std::fs::read_to_string(&page)
        .with_context(|| format!("Failed to read page: {:?}", page))?;

    let reader: Box<dyn Read> = match changes {
        Some(ref path) => Box::new(open(path)?),
        None => Box::new(std::io::stdin()),
    };

    let engine = replay(&html, BufReader::new(reader), output)?;

    for message in engine.outbox() {
        output.print_event(message);
    }
    for fired in engine.effects().fired() {
        output.message(&format!("effect {} on '{}'", fired.name, fired.reference));
    }
    output.print_html(&engine.document().outer_html(engine.document().root()));
    Ok(())
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("Failed to open changes: {:?}", path))
}

/// Apply every non-blank line in order
fn replay(
    html: &str,
    changes: impl BufRead,
    output: &Output,
) -> Result<SyncEngine<Vec<EventMessage>>> {
    let mut engine = SyncEngine::new(Document::parse(html), Vec::new());

    for (index, line) in changes.lines().enumerate() {
        let line = line.context("Failed to read changes")?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = engine.handle_inbound(&line);
        output.print_outcome(index + 1, outcome.as_ref());
    }
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use std::io::Write;

    const PAGE: &str = r#"<html id="s"><body><ul ref="list"></ul><p ref="msg">hi</p></body></html>"#;

    #[test]
    fn test_replay_applies_in_order() {
        let changes = concat!(
            r#"{"ref":"list","type":"added","value":"<li ref=\"a\">A</li>"}"#,
            "\n\n",
            r#"{"ref":"msg","type":"update","name":"text","value":"bye"}"#,
            "\n",
            "not json\n",
            r#"{"ref":"a","type":"trigger","value":"click"}"#,
            "\n",
        );
        let output = Output::new(OutputFormat::Quiet);

        let engine = replay(PAGE, changes.as_bytes(), &output).unwrap();
        let html = engine.document().outer_html(engine.document().root());

        assert!(html.contains(r#"<li ref="a">A</li>"#));
        assert!(html.contains(r#"<p ref="msg">bye</p>"#));
        // "a" is not clickable
        assert!(engine.outbox().is_empty());
        assert_eq!(engine.effects().fired().len(), 1);
    }

    #[test]
    fn test_apply_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        let changes = dir.path().join("changes.jsonl");
        std::fs::write(&page, PAGE).unwrap();
        let mut file = std::fs::File::create(&changes).unwrap();
        writeln!(file, r#"{{"ref":"msg","type":"update","name":"text","value":"x"}}"#).unwrap();

        let output = Output::new(OutputFormat::Quiet);
        apply(page, Some(changes), &output).unwrap();
    }

    #[test]
    fn test_apply_missing_page() {
        let output = Output::new(OutputFormat::Quiet);
        assert!(apply(PathBuf::from("/nonexistent/page.html"), None, &output).is_err());
    }
}
