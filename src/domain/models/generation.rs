#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;

use std::collections::VecDeque;

use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::SessionStatus;
use super::StreamSession;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// A finished generation. Only completed sessions produce one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    text: String,
    prompt: String,
    model: String,
    started_at: String,
    finished_at: String,
}

impl GenerationRecord {
    pub fn from_session(session: &StreamSession, prompt: &str, model: &str) -> Option<GenerationRecord> {
        if session.status() != SessionStatus::Completed {
            return None;
        }

        let finished_at = session.ended_at().unwrap_or_else(Local::now);

        return Some(GenerationRecord {
            text: session.text().to_string(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            started_at: session
                .started_at()
                .to_rfc3339_opts(SecondsFormat::Millis, false),
            finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Millis, false),
        });
    }

    pub fn text(&self) -> &str {
        return &self.text;
    }

    pub fn prompt(&self) -> &str {
        return &self.prompt;
    }

    pub fn model(&self) -> &str {
        return &self.model;
    }

    pub fn finished_at(&self) -> &str {
        return &self.finished_at;
    }
}

/// Newest-first list of records. The oldest record is evicted once the
/// capacity is reached.
#[derive(Clone, Debug)]
pub struct GenerationHistory {
    records: VecDeque<GenerationRecord>,
    capacity: usize,
}

impl Default for GenerationHistory {
    fn default() -> GenerationHistory {
        return GenerationHistory::new(DEFAULT_HISTORY_CAPACITY);
    }
}

impl GenerationHistory {
    pub fn new(capacity: usize) -> GenerationHistory {
        let capacity = capacity.max(1);
        return GenerationHistory {
            records: VecDeque::with_capacity(capacity),
            capacity,
        };
    }

    pub fn push(&mut self, record: GenerationRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_back();
        }

        self.records.push_front(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationRecord> {
        return self.records.iter();
    }

    pub fn is_empty(&self) -> bool {
        return self.records.is_empty();
    }

}
