use std::time::Duration;

use anyhow::Result;

use super::CompactView;
use crate::application::views::View;
use crate::domain::models::Event;
use crate::domain::models::ModelInfo;
use crate::domain::models::ModelKind;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamOutcome;

fn finished(text: &str, status: SessionStatus) -> Event {
    return Event::StreamFinished(StreamOutcome {
        session_id: "abc-def".to_string(),
        text: text.to_string(),
        status,
        elapsed: Duration::from_millis(500),
        warnings: 0,
    });
}

fn render(events: Vec<Event>) -> Result<String> {
    owo_colors::set_override(false);

    let mut out: Vec<u8> = vec![];
    let mut view = CompactView::default();
    for event in events {
        view.render(&event, &mut out)?;
    }

    return Ok(String::from_utf8(out)?);
}

#[test]
fn it_prints_only_the_final_text() -> Result<()> {
    let output = render(vec![
        Event::StreamDelta {
            session_id: "abc-def".to_string(),
            delta: "Hel".to_string(),
            accumulated: "Hel".to_string(),
        },
        Event::StreamDelta {
            session_id: "abc-def".to_string(),
            delta: "lo".to_string(),
            accumulated: "Hello".to_string(),
        },
        finished("Hello", SessionStatus::Completed),
    ])?;

    insta::assert_snapshot!(output, @r###"
    Hello
    (completed, 0.50s)
    "###);

    return Ok(());
}

#[test]
fn it_prints_a_status_for_failures() -> Result<()> {
    let output = render(vec![finished("", SessionStatus::Failed)])?;

    assert_eq!(output, "(failed, 0.50s)\n");

    return Ok(());
}

#[test]
fn it_lists_models() -> Result<()> {
    let mut flux = ModelInfo::new("flux", ModelKind::Image);
    flux.description = Some("Flux Schnell".to_string());

    let output = render(vec![Event::ModelsListed(vec![
        ModelInfo::new("openai", ModelKind::Text),
        flux,
        ModelInfo::new("veo", ModelKind::Video),
    ])])?;

    insta::assert_snapshot!(output, @r###"
    - openai (text)
    - flux (image): Flux Schnell
    - veo (video)
    "###);

    return Ok(());
}

#[test]
fn it_handles_an_empty_model_list() -> Result<()> {
    let output = render(vec![Event::ModelsListed(vec![])])?;

    assert_eq!(output, "No models available.\n");

    return Ok(());
}
