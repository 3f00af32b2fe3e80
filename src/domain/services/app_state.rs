#[cfg(test)]
#[path = "app_state_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use super::actions::help_text;
use crate::domain::models::Action;
use crate::domain::models::Author;
use crate::domain::models::BackendPrompt;
use crate::domain::models::Balance;
use crate::domain::models::Event;
use crate::domain::models::GenerationHistory;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::ModelInfo;
use crate::domain::models::SessionStatus;
use crate::domain::models::SlashCommand;
use crate::domain::models::Usage;

/// First line of `text`, cut to fit a history entry.
fn preview(text: &str) -> String {
    let line = text.split('\n').next().unwrap_or("");
    if line.chars().count() >= 50 {
        return format!("{}...", line.chars().take(47).collect::<String>());
    }

    return line.to_string();
}

/// Everything the views know about. Owned by the UI loop and updated only by
/// folding in [`Event`]s.
pub struct AppState {
    /// Image URLs or paths waiting to go out with the next prompt.
    pub attachments: Vec<String>,
    pub balance: Balance,
    pub history: GenerationHistory,
    pub last_response_time: Option<Duration>,
    pub last_usage: Option<Usage>,
    pub messages: Vec<Message>,
    pub model: String,
    pub models: Vec<ModelInfo>,
    pub notices: Vec<Message>,
    pub streaming_text: String,
    pub waiting_for_backend: bool,
}

impl AppState {
    pub fn new(model: &str, history_capacity: usize) -> AppState {
        return AppState {
            attachments: vec![],
            balance: Balance::Unknown,
            history: GenerationHistory::new(history_capacity),
            last_response_time: None,
            last_usage: None,
            messages: vec![],
            model: model.to_string(),
            models: vec![],
            notices: vec![],
            streaming_text: "".to_string(),
            waiting_for_backend: false,
        };
    }

    pub fn handle_event(&mut self, event: &Event) {
        match event {
            Event::StreamDelta { accumulated, .. } => {
                self.waiting_for_backend = true;
                self.streaming_text = accumulated.to_string();
            }
            Event::StreamFinished(outcome) => {
                self.waiting_for_backend = false;
                self.last_response_time = Some(outcome.elapsed);
                self.streaming_text = "".to_string();

                if outcome.status == SessionStatus::Completed && !outcome.text.is_empty() {
                    self.messages.push(Message::new(Author::Model, &outcome.text));
                }
            }
            Event::GenerationRecorded(record) => {
                self.history.push(record.clone());
            }
            Event::BalanceUpdated(balance) => {
                self.balance = *balance;
            }
            Event::UsageReported(usage) => {
                self.last_usage = Some(*usage);
            }
            Event::ModelsListed(models) => {
                self.models = models.clone();
            }
            Event::BackendMessage(_) => {}
        }
    }

    /// Records the user's turn and builds the request carrying prior turns.
    pub fn prompt(&mut self, text: &str, template: &BackendPrompt) -> BackendPrompt {
        let mut prompt = template.clone().with_history(&self.messages);
        prompt.text = text.to_string();
        prompt.model = self.model.to_string();

        self.messages.push(Message::new(Author::User, text));
        self.waiting_for_backend = true;

        return prompt;
    }

    pub fn take_attachments(&mut self) -> Vec<String> {
        return std::mem::take(&mut self.attachments);
    }

    pub fn new_chat(&mut self) {
        self.messages.clear();
        self.streaming_text = "".to_string();
    }

    pub fn take_notices(&mut self) -> Vec<Message> {
        return std::mem::take(&mut self.notices);
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(Message::new(Author::Pollen, text));
    }

    fn notice_error(&mut self, text: &str) {
        self.notices
            .push(Message::new_with_type(Author::Pollen, MessageType::Error, text));
    }

    pub fn format_history(&self) -> String {
        if self.history.is_empty() {
            return "No generations yet.".to_string();
        }

        return self
            .history
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                return format!(
                    "- ({}) {}, Model: {}, {} => {}",
                    idx + 1,
                    record.finished_at(),
                    record.model(),
                    preview(record.prompt()),
                    preview(record.text())
                );
            })
            .collect::<Vec<String>>()
            .join("\n");
    }

    /// Returns `(should_break, should_continue)`: whether the chat loop should
    /// exit, and whether the input was consumed as a command.
    pub fn handle_slash_commands(
        &mut self,
        input: &str,
        tx: &mpsc::UnboundedSender<Action>,
    ) -> Result<(bool, bool)> {
        let command = match SlashCommand::parse(input) {
            Some(command) => command,
            None => return Ok((false, false)),
        };

        if command.is_quit() {
            return Ok((true, false));
        }

        if command.is_model_list() {
            tx.send(Action::ListModels(None))?;
        } else if command.is_model_set() {
            if let Some(model) = command.args.first() {
                self.model = model.to_string();
                self.notice(&format!("{model} has entered the chat."));
            } else {
                self.notice_error(
                    "You must specify a model name with `/model` or `/m`. Run `/help` for more details.",
                );
            }
        } else if command.is_balance() {
            tx.send(Action::RefreshBalance())?;
        } else if command.is_new_chat() {
            self.new_chat();
            self.notice("Started a new chat.");
        } else if command.is_history() {
            let history = self.format_history();
            self.notice(&history);
        } else if command.is_attach() {
            if command.args.is_empty() {
                self.notice_error(
                    "You must specify an image URL or path with `/attach` or `/a`. Run `/help` for more details.",
                );
            } else {
                let source = command.args.join(" ");
                self.notice(&format!("Attached {source} to your next message."));
                self.attachments.push(source);
            }
        } else if command.is_help() {
            self.notice(&help_text());
        }

        return Ok((false, true));
    }
}
