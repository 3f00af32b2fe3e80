#[cfg(test)]
#[path = "compact_test.rs"]
mod tests;

use std::io;

use anyhow::Result;

use super::format_elapsed;
use super::render_common;
use super::View;
use crate::domain::models::Event;

/// Waits for the session to settle, then prints the text and a one-line
/// status.
#[derive(Default)]
pub struct CompactView {}

impl View for CompactView {
    fn render(&mut self, event: &Event, out: &mut dyn io::Write) -> Result<()> {
        match event {
            Event::StreamDelta { .. } | Event::UsageReported(_) | Event::GenerationRecorded(_) => {}
            Event::StreamFinished(outcome) => {
                if !outcome.text.is_empty() {
                    writeln!(out, "{}", outcome.text)?;
                }
                writeln!(out, "({}, {})", outcome.status, format_elapsed(outcome))?;
            }
            _ => {
                return render_common(event, out);
            }
        }
        out.flush()?;

        return Ok(());
    }
}
