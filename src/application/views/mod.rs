mod compact;
mod desktop;

use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use owo_colors::Stream;
use serde_derive::Deserialize;
use serde_derive::Serialize;

pub use compact::*;
pub use desktop::*;

use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::ModelInfo;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamOutcome;

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumVariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum ViewName {
    Desktop,
    Compact,
}

/// Renders [`Event`]s as text. Views hold no generation state of their own;
/// everything they print comes from the event being rendered.
pub trait View {
    fn render(&mut self, event: &Event, out: &mut dyn io::Write) -> Result<()>;

    fn notice(&mut self, message: &Message, out: &mut dyn io::Write) -> Result<()> {
        writeln!(out, "{}", format_message(message))?;
        out.flush()?;

        return Ok(());
    }
}

pub struct ViewManager {}

impl ViewManager {
    pub fn get(name: ViewName) -> Box<dyn View + Send> {
        match name {
            ViewName::Desktop => return Box::<DesktopView>::default(),
            ViewName::Compact => return Box::<CompactView>::default(),
        }
    }
}

pub fn format_message(message: &Message) -> String {
    if message.is_error() {
        return message
            .text
            .if_supports_color(Stream::Stdout, |text| return text.red())
            .to_string();
    }

    return message.text.to_string();
}

pub fn format_models(models: &[ModelInfo]) -> String {
    if models.is_empty() {
        return "No models available.".to_string();
    }

    return models
        .iter()
        .map(|model| {
            let mut line = format!("- {} ({})", model.id, model.kind);
            if let Some(description) = &model.description {
                line = format!("{line}: {description}");
            }
            return line;
        })
        .collect::<Vec<String>>()
        .join("\n");
}

pub fn format_elapsed(outcome: &StreamOutcome) -> String {
    return format!("{:.2}s", outcome.elapsed.as_secs_f64());
}

pub fn format_status(outcome: &StreamOutcome) -> String {
    let mut status = match outcome.status {
        SessionStatus::Completed => format!("Completed in {}", format_elapsed(outcome)),
        SessionStatus::Cancelled => format!("Stopped after {}", format_elapsed(outcome)),
        SessionStatus::Failed => format!("Failed after {}", format_elapsed(outcome)),
        SessionStatus::Active => "Generating...".to_string(),
    };

    if outcome.warnings == 1 {
        status = format!("{status}, 1 frame skipped");
    } else if outcome.warnings > 1 {
        status = format!("{status}, {} frames skipped", outcome.warnings);
    }

    return status;
}

/// Events both views print the same way.
fn render_common(event: &Event, out: &mut dyn io::Write) -> Result<()> {
    match event {
        Event::BalanceUpdated(balance) => {
            writeln!(out, "{balance}")?;
        }
        Event::ModelsListed(models) => {
            writeln!(out, "{}", format_models(models))?;
        }
        Event::BackendMessage(message) => {
            writeln!(out, "{}", format_message(message))?;
        }
        _ => {}
    }
    out.flush()?;

    return Ok(());
}
