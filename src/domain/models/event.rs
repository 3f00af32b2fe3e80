use super::Balance;
use super::GenerationRecord;
use super::Message;
use super::ModelInfo;
use super::StreamOutcome;
use super::Usage;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A decoded delta together with everything accumulated so far.
    StreamDelta {
        session_id: String,
        delta: String,
        accumulated: String,
    },
    /// Sent exactly once per session when it reaches a terminal state.
    StreamFinished(StreamOutcome),
    GenerationRecorded(GenerationRecord),
    BalanceUpdated(Balance),
    UsageReported(Usage),
    ModelsListed(Vec<ModelInfo>),
    BackendMessage(Message),
}
