#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::decoder::StreamingCompletionDecoder;
use crate::domain::models::Action;
use crate::domain::models::Author;
use crate::domain::models::BackendPrompt;
use crate::domain::models::CancelHandle;
use crate::domain::models::Event;
use crate::domain::models::GenerationRecord;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::ModelKind;
use crate::domain::models::SessionStatus;
use crate::domain::models::SharedBackend;
use crate::domain::models::StreamOutcome;
use crate::domain::models::StreamSession;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /models (/ml) - Lists all text, image, and video models offered by the API.
- /model (/m) [MODEL_NAME] - Uses the specified model for the following prompts.
- /balance (/b) - Shows the current account balance.
- /new (/n) - Starts a new chat, forgetting previous turns.
- /history (/hi) - Lists the most recent generations.
- /attach (/a) [URL_OR_PATH] - Attaches an image to your next message.
- /quit /exit (/q) - Exit Pollen.
- /help (/h) - Provides this help menu.

HOTKEYS:
- CTRL+C - Stop the generation in progress, otherwise exit.
        "#;

    return text.trim().to_string();
}

fn worker_error(err: anyhow::Error, tx: &mpsc::UnboundedSender<Event>) -> Result<()> {
    tx.send(Event::BackendMessage(Message::new_with_type(
        Author::Pollen,
        MessageType::Error,
        &format!("The request failed with the following error: {err}"),
    )))?;

    return Ok(());
}

fn stopped(tx: &mpsc::UnboundedSender<Event>) -> Result<()> {
    tx.send(Event::BackendMessage(Message::new(Author::Pollen, "Stopped.")))?;

    return Ok(());
}

/// Streams one prompt through the decoder. Cancellation is honoured while
/// the request is still connecting.
async fn stream_completion(
    backend: &SharedBackend,
    prompt: &BackendPrompt,
    session: &mut StreamSession,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<StreamOutcome> {
    let cancel = session.cancel_handle();
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = backend.open_stream(prompt) => Some(res),
    };

    let decoder = StreamingCompletionDecoder::new(session, tx);
    let outcome = match opened {
        None => decoder.cancel(),
        Some(Err(err)) => return Err(decoder.fail(err).into()),
        Some(Ok(stream)) => decoder.decode(stream).await?,
    };

    return Ok(outcome);
}

/// Requests the whole completion at once and reports it through the same
/// events a stream would produce.
async fn single_completion(
    backend: &SharedBackend,
    prompt: &BackendPrompt,
    session: &mut StreamSession,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<StreamOutcome> {
    let cancel = session.cancel_handle();
    let res = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = backend.complete(prompt) => Some(res),
    };

    let status = match res {
        None => SessionStatus::Cancelled,
        Some(Err(err)) => {
            session.finish(SessionStatus::Failed);
            tx.send(Event::StreamFinished(StreamOutcome::from_session(session, 0)))?;
            return Err(err);
        }
        Some(Ok(completion)) => {
            if !completion.text.is_empty() {
                session.append(&completion.text);
                tx.send(Event::StreamDelta {
                    session_id: session.id().to_string(),
                    delta: completion.text.to_string(),
                    accumulated: session.text().to_string(),
                })?;
            }
            if let Some(usage) = completion.usage {
                tx.send(Event::UsageReported(usage))?;
            }
            SessionStatus::Completed
        }
    };

    session.finish(status);
    let outcome = StreamOutcome::from_session(session, 0);
    tx.send(Event::StreamFinished(outcome.clone()))?;

    return Ok(outcome);
}

async fn run_generation(
    backend: SharedBackend,
    prompt: BackendPrompt,
    mut session: StreamSession,
    tx: mpsc::UnboundedSender<Event>,
) -> Result<()> {
    tracing::debug!(
        session = session.id(),
        model = prompt.model.as_str(),
        stream = prompt.stream,
        "Starting generation"
    );

    let res = if prompt.stream {
        stream_completion(&backend, &prompt, &mut session, &tx).await
    } else {
        single_completion(&backend, &prompt, &mut session, &tx).await
    };

    match res {
        Ok(outcome) if outcome.status == SessionStatus::Completed => {
            if let Some(record) = GenerationRecord::from_session(&session, &prompt.text, &prompt.model) {
                tx.send(Event::GenerationRecorded(record))?;
            }
        }
        Ok(_) => {
            stopped(&tx)?;
        }
        Err(err) => {
            worker_error(err, &tx)?;
        }
    }

    return Ok(());
}

struct Worker {
    cancel: CancelHandle,
    handle: JoinHandle<Result<()>>,
}

impl Worker {
    fn spawn(backend: SharedBackend, prompt: BackendPrompt, tx: mpsc::UnboundedSender<Event>) -> Worker {
        let session = StreamSession::new();
        let cancel = session.cancel_handle();
        let handle = tokio::spawn(async move {
            return run_generation(backend, prompt, session, tx).await;
        });

        return Worker { cancel, handle };
    }

    /// Waits for the session to settle, cancelling it first when asked to.
    async fn settle(self, cancel: bool) -> Result<()> {
        if cancel {
            self.cancel.request_cancellation();
        }

        match self.handle.await {
            Ok(res) => return res,
            Err(err) => {
                tracing::error!(error = ?err, "Generation worker panicked");
                return Ok(());
            }
        }
    }
}

async fn model_list(
    backend: &SharedBackend,
    tx: &mpsc::UnboundedSender<Event>,
    kind: Option<ModelKind>,
) -> Result<()> {
    let mut models = backend.list_models().await?;
    if let Some(kind) = kind {
        models.retain(|model| return model.kind == kind);
    }
    models.sort_by(|a, b| return a.id.cmp(&b.id));

    tx.send(Event::ModelsListed(models))?;
    return Ok(());
}

async fn balance(backend: &SharedBackend, tx: &mpsc::UnboundedSender<Event>) -> Result<()> {
    let balance = backend.balance().await?;
    tx.send(Event::BalanceUpdated(balance))?;

    return Ok(());
}

pub struct ActionsService {}

impl ActionsService {
    /// Serves actions until every sender is dropped. At most one generation
    /// runs at a time; a new one first cancels and awaits its predecessor.
    pub async fn start(
        backend: SharedBackend,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        let mut worker: Option<Worker> = None;

        while let Some(action) = rx.recv().await {
            match action {
                Action::Abort() => {
                    if let Some(current) = &worker {
                        current.cancel.request_cancellation();
                    }
                }
                Action::Generate(prompt) => {
                    if let Some(previous) = worker.take() {
                        previous.settle(true).await?;
                    }
                    worker = Some(Worker::spawn(backend.clone(), prompt, tx.clone()));
                }
                Action::ListModels(kind) => {
                    if let Err(err) = model_list(&backend, &tx, kind).await {
                        worker_error(err, &tx)?;
                    }
                }
                Action::RefreshBalance() => {
                    if let Err(err) = balance(&backend, &tx).await {
                        worker_error(err, &tx)?;
                    }
                }
            }
        }

        if let Some(current) = worker.take() {
            current.settle(false).await?;
        }

        return Ok(());
    }
}
