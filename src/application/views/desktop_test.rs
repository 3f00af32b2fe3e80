use std::time::Duration;

use anyhow::Result;

use super::DesktopView;
use crate::application::views::View;
use crate::domain::models::Author;
use crate::domain::models::Balance;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamOutcome;
use crate::domain::models::Usage;

fn delta(delta: &str, accumulated: &str) -> Event {
    return Event::StreamDelta {
        session_id: "abc-def".to_string(),
        delta: delta.to_string(),
        accumulated: accumulated.to_string(),
    };
}

fn finished(text: &str, status: SessionStatus, warnings: usize) -> Event {
    return Event::StreamFinished(StreamOutcome {
        session_id: "abc-def".to_string(),
        text: text.to_string(),
        status,
        elapsed: Duration::from_millis(1234),
        warnings,
    });
}

fn render(events: Vec<Event>) -> Result<String> {
    owo_colors::set_override(false);

    let mut out: Vec<u8> = vec![];
    let mut view = DesktopView::default();
    for event in events {
        view.render(&event, &mut out)?;
    }

    return Ok(String::from_utf8(out)?);
}

#[test]
fn it_streams_deltas_as_they_arrive() -> Result<()> {
    let output = render(vec![
        delta("Hel", "Hel"),
        delta("lo", "Hello"),
        finished("Hello", SessionStatus::Completed, 0),
    ])?;

    insta::assert_snapshot!(output, @r###"
    Hello
    [Completed in 1.23s]
    "###);

    return Ok(());
}

#[test]
fn it_reports_skipped_frames() -> Result<()> {
    let output = render(vec![
        delta("Hi", "Hi"),
        finished("Hi", SessionStatus::Completed, 2),
    ])?;

    assert_eq!(output, "Hi\n[Completed in 1.23s, 2 frames skipped]\n");

    return Ok(());
}

#[test]
fn it_reports_a_stop() -> Result<()> {
    let output = render(vec![
        finished("", SessionStatus::Cancelled, 0),
        Event::BackendMessage(Message::new(Author::Pollen, "Stopped.")),
    ])?;

    insta::assert_snapshot!(output, @r###"
    [Stopped after 1.23s]
    Stopped.
    "###);

    return Ok(());
}

#[test]
fn it_renders_usage_and_balance() -> Result<()> {
    let output = render(vec![
        Event::UsageReported(Usage {
            prompt_tokens: 400,
            completion_tokens: 600,
            total_tokens: 1000,
        }),
        Event::BalanceUpdated(Balance::Unknown),
        Event::BackendMessage(Message::new_with_type(
            Author::Pollen,
            MessageType::Error,
            "The request failed",
        )),
    ])?;

    insta::assert_snapshot!(output, @r###"
    Tokens: 1000, Cost: $0.0020
    Balance: unknown
    The request failed
    "###);

    return Ok(());
}
