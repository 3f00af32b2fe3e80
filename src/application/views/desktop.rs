#[cfg(test)]
#[path = "desktop_test.rs"]
mod tests;

use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use owo_colors::Stream;

use super::format_status;
use super::render_common;
use super::View;
use crate::domain::models::Event;

/// Prints every delta the moment it arrives, followed by the response time
/// and final status.
#[derive(Default)]
pub struct DesktopView {}

impl View for DesktopView {
    fn render(&mut self, event: &Event, out: &mut dyn io::Write) -> Result<()> {
        match event {
            Event::StreamDelta { delta, .. } => {
                write!(out, "{delta}")?;
            }
            Event::StreamFinished(outcome) => {
                if !outcome.text.is_empty() {
                    writeln!(out)?;
                }
                writeln!(
                    out,
                    "{}",
                    format!("[{}]", format_status(outcome))
                        .if_supports_color(Stream::Stdout, |text| return text.dimmed())
                )?;
            }
            Event::UsageReported(usage) => {
                writeln!(out, "{usage}")?;
            }
            Event::GenerationRecorded(_) => {}
            _ => {
                return render_common(event, out);
            }
        }
        out.flush()?;

        return Ok(());
    }
}
