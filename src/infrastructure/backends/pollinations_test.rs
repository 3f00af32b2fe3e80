use std::env;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use mockito::Matcher;
use serde_json::json;
use test_utils::sse_fixture;
use test_utils::sse_noisy_fixture;
use tokio::fs;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::Pollinations;
use crate::domain::models::Backend;
use crate::domain::models::BackendPrompt;
use crate::domain::models::Balance;
use crate::domain::models::Event;
use crate::domain::models::ImageRequest;
use crate::domain::models::ModelInfo;
use crate::domain::models::ModelKind;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamError;
use crate::domain::models::StreamSession;
use crate::domain::services::decoder::StreamingCompletionDecoder;

impl Pollinations {
    fn with_url(url: String) -> Pollinations {
        return Pollinations::new(&url, "abc", Duration::from_millis(500));
    }
}

#[tokio::test]
async fn it_successfully_health_checks() {
    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/v1/models").with_status(200).create();

    let backend = Pollinations::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_ok());
    mock.assert();
}

#[tokio::test]
async fn it_fails_health_checks() {
    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/v1/models").with_status(500).create();

    let backend = Pollinations::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_err());
    mock.assert();
}

#[tokio::test]
async fn it_fails_health_checks_with_a_bad_key() {
    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/v1/models").with_status(401).create();

    let backend = Pollinations::with_url(server.url());
    let err = backend.health_check().await.unwrap_err();

    assert_eq!(err.to_string(), "Pollinations rejected the API key (HTTP 401)");
    mock.assert();
}

#[tokio::test]
async fn it_lists_models() -> Result<()> {
    let mut server = mockito::Server::new();
    let text_mock = server
        .mock("GET", "/v1/models")
        .match_header("Authorization", "Bearer abc")
        .with_status(200)
        .with_body(json!({ "data": [{ "id": "openai" }, { "id": "mistral" }] }).to_string())
        .create();
    let media_mock = server
        .mock("GET", "/image/models")
        .match_header("Authorization", "Bearer abc")
        .with_status(200)
        .with_body(
            json!([
                { "name": "flux", "description": "Flux Schnell" },
                { "name": "veo" },
                "turbo",
                { "name": "wan-video" },
            ])
            .to_string(),
        )
        .create();

    let backend = Pollinations::with_url(server.url());
    let res = backend.list_models().await?;
    text_mock.assert();
    media_mock.assert();

    let mut flux = ModelInfo::new("flux", ModelKind::Image);
    flux.description = Some("Flux Schnell".to_string());

    assert_eq!(
        res,
        vec![
            ModelInfo::new("openai", ModelKind::Text),
            ModelInfo::new("mistral", ModelKind::Text),
            flux,
            ModelInfo::new("veo", ModelKind::Video),
            ModelInfo::new("turbo", ModelKind::Image),
            ModelInfo::new("wan-video", ModelKind::Video),
        ]
    );

    return Ok(());
}

#[tokio::test]
async fn it_lists_models_when_one_catalog_fails() -> Result<()> {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body(json!({ "data": [{ "id": "openai" }] }).to_string())
        .create();
    server.mock("GET", "/image/models").with_status(502).create();

    let backend = Pollinations::with_url(server.url());
    let res = backend.list_models().await?;

    assert_eq!(res, vec![ModelInfo::new("openai", ModelKind::Text)]);

    return Ok(());
}

#[tokio::test]
async fn it_fails_to_list_models_when_both_catalogs_fail() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/v1/models").with_status(500).create();
    server.mock("GET", "/image/models").with_status(500).create();

    let backend = Pollinations::with_url(server.url());
    assert!(backend.list_models().await.is_err());
}

#[tokio::test]
async fn it_reads_the_balance() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/usage")
        .match_header("Authorization", "Bearer abc")
        .with_status(200)
        .with_body(json!({ "balance": 12.5 }).to_string())
        .create();

    let backend = Pollinations::with_url(server.url());
    let res = backend.balance().await?;
    mock.assert();

    assert_eq!(res, Balance::Known(12.5));

    return Ok(());
}

#[tokio::test]
async fn it_reports_an_unknown_balance_without_a_field() -> Result<()> {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/usage")
        .with_status(200)
        .with_body(json!({ "requests": 3 }).to_string())
        .create();

    let backend = Pollinations::with_url(server.url());
    assert_eq!(backend.balance().await?, Balance::Unknown);

    return Ok(());
}

#[tokio::test]
async fn it_reports_an_unknown_balance_without_an_endpoint() -> Result<()> {
    let mut server = mockito::Server::new();
    server.mock("GET", "/usage").with_status(404).create();

    let backend = Pollinations::with_url(server.url());
    assert_eq!(backend.balance().await?, Balance::Unknown);

    return Ok(());
}

#[tokio::test]
async fn it_fails_the_balance_on_server_errors() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/usage")
        .with_status(500)
        .with_body(json!({ "message": "database is down" }).to_string())
        .create();

    let backend = Pollinations::with_url(server.url());
    let err = backend.balance().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Failed to fetch balance (HTTP 500): database is down"
    );
}

#[tokio::test]
async fn it_streams_completions_through_the_decoder() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("Authorization", "Bearer abc")
        .match_body(Matcher::PartialJson(json!({
            "model": "openai",
            "stream": true,
            "messages": [{ "role": "user", "content": "Say hi" }],
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_fixture())
        .create();

    let backend = Pollinations::with_url(server.url());
    let stream = backend
        .open_stream(&BackendPrompt::new("Say hi", "openai"))
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = StreamSession::new();
    let outcome = StreamingCompletionDecoder::new(&mut session, &tx)
        .decode(stream)
        .await?;
    mock.assert();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.text, "Hello");
    assert_eq!(outcome.warnings, 0);

    let mut deltas = vec![];
    while let Ok(event) = rx.try_recv() {
        if let Event::StreamDelta { delta, .. } = event {
            deltas.push(delta);
        }
    }
    assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);

    return Ok(());
}

#[tokio::test]
async fn it_streams_noisy_completions() -> Result<()> {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse_noisy_fixture())
        .create();

    let backend = Pollinations::with_url(server.url());
    let stream = backend
        .open_stream(&BackendPrompt::new("Greet Cologne", "openai"))
        .await?;

    let (tx, _rx) = mpsc::unbounded_channel::<Event>();
    let mut session = StreamSession::new();
    let outcome = StreamingCompletionDecoder::new(&mut session, &tx)
        .decode(stream)
        .await?;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.text, "Grüße aus Köln 🌧");
    assert_eq!(outcome.warnings, 2);

    return Ok(());
}

#[tokio::test]
async fn it_sends_generation_options() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "temperature": 0.5,
            "max_tokens": 64,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": "Answer in JSON." },
                { "role": "user", "content": "List colours" },
            ],
        })))
        .with_status(200)
        .with_body(sse_fixture())
        .create();

    let mut prompt = BackendPrompt::new("List colours", "openai");
    prompt.system_prompt = Some("Answer in JSON.".to_string());
    prompt.temperature = 0.5;
    prompt.max_tokens = Some(64);
    prompt.json_mode = true;

    let backend = Pollinations::with_url(server.url());
    let mut stream = backend.open_stream(&prompt).await?;
    while stream.next().await.is_some() {}
    mock.assert();

    return Ok(());
}

#[tokio::test]
async fn it_sends_attached_images_as_content_parts() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "Describe this" },
                    { "type": "image_url", "image_url": { "url": "data:image/png;base64,iVBORw==" } },
                ],
            }],
        })))
        .with_status(200)
        .with_body(sse_fixture())
        .create();

    let mut prompt = BackendPrompt::new("Describe this", "openai");
    prompt.attachments = vec!["data:image/png;base64,iVBORw==".to_string()];

    let backend = Pollinations::with_url(server.url());
    let mut stream = backend.open_stream(&prompt).await?;
    while stream.next().await.is_some() {}
    mock.assert();

    return Ok(());
}

#[tokio::test]
async fn it_fails_to_open_a_stream() -> Result<()> {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(json!({ "error": { "message": "Invalid API key" } }).to_string())
        .create();

    let backend = Pollinations::with_url(server.url());
    let res = backend
        .open_stream(&BackendPrompt::new("Say hi", "openai"))
        .await;

    match res {
        Err(err) => assert_eq!(err, StreamError::status(401, "Invalid API key")),
        Ok(_) => panic!("expected a transport error"),
    }

    return Ok(());
}

#[tokio::test]
async fn it_fails_to_open_a_stream_without_a_server() -> Result<()> {
    let backend = Pollinations::with_url("http://127.0.0.1:1".to_string());
    let res = backend
        .open_stream(&BackendPrompt::new("Say hi", "openai"))
        .await;

    assert!(matches!(res, Err(StreamError::Transport { status: None, .. })));

    return Ok(());
}

#[tokio::test]
async fn it_completes_without_streaming() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "stream": false })))
        .with_status(200)
        .with_body(
            json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hello" } }],
                "usage": { "prompt_tokens": 4, "completion_tokens": 1, "total_tokens": 5 },
            })
            .to_string(),
        )
        .create();

    let mut prompt = BackendPrompt::new("Say hi", "openai");
    prompt.stream = false;

    let backend = Pollinations::with_url(server.url());
    let res = backend.complete(&prompt).await?;
    mock.assert();

    assert_eq!(res.text, "Hello");
    assert_eq!(res.usage.map(|usage| return usage.total_tokens), Some(5));

    return Ok(());
}

#[tokio::test]
async fn it_fails_to_complete() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .create();

    let backend = Pollinations::with_url(server.url());
    let err = backend
        .complete(&BackendPrompt::new("Say hi", "openai"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "transport error (HTTP 500): Internal Server Error"
    );
}

#[test]
fn it_builds_image_urls() -> Result<()> {
    let backend = Pollinations::with_url("http://localhost".to_string());
    let url = backend.image_url(&ImageRequest::new("a red fox"))?;

    assert_eq!(
        url.as_str(),
        "http://localhost/image/a%20red%20fox?model=flux&width=1024&height=1024&seed=0&negative_prompt=worst+quality%2C+blurry"
    );

    return Ok(());
}

#[test]
fn it_builds_image_urls_with_options() -> Result<()> {
    let mut req = ImageRequest::new("fox/cat");
    req.negative_prompt = None;
    req.enhance = true;
    req.safe = true;
    req.duration = Some(4);

    let backend = Pollinations::with_url("http://localhost/".to_string());
    let url = backend.image_url(&req)?;

    assert_eq!(
        url.as_str(),
        "http://localhost/image/fox%2Fcat?model=flux&width=1024&height=1024&seed=0&enhance=true&safe=true"
    );

    return Ok(());
}

#[test]
fn it_builds_video_urls() -> Result<()> {
    let mut req = ImageRequest::new("waves");
    req.model = "veo".to_string();
    req.negative_prompt = None;
    req.duration = Some(4);
    req.aspect_ratio = Some("16:9".to_string());
    req.audio = true;

    let backend = Pollinations::with_url("http://localhost".to_string());
    let url = backend.image_url(&req)?;

    assert_eq!(
        url.as_str(),
        "http://localhost/image/waves?model=veo&width=1024&height=1024&seed=0&duration=4&aspectRatio=16%3A9&audio=true"
    );

    return Ok(());
}

#[tokio::test]
async fn it_generates_images() -> Result<()> {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/image/a%20red%20fox")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("model".to_string(), "flux".to_string()),
            Matcher::UrlEncoded("seed".to_string(), "0".to_string()),
        ]))
        .match_header("Authorization", "Bearer abc")
        .with_status(200)
        .with_body(vec![0x89, 0x50, 0x4e, 0x47])
        .create();

    let dest = env::temp_dir()
        .join(format!("pollen-test-{}", Uuid::new_v4()))
        .join("fox.png");

    let backend = Pollinations::with_url(server.url());
    let written = backend
        .generate_image(&ImageRequest::new("a red fox"), &dest)
        .await?;
    mock.assert();

    assert_eq!(written, 4);
    assert_eq!(fs::read(&dest).await?, vec![0x89, 0x50, 0x4e, 0x47]);

    if let Some(parent) = dest.parent() {
        fs::remove_dir_all(parent).await?;
    }

    return Ok(());
}

#[tokio::test]
async fn it_fails_to_generate_images() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", Matcher::Regex("^/image/".to_string()))
        .with_status(429)
        .create();

    let dest = env::temp_dir().join(format!("pollen-test-{}.png", Uuid::new_v4()));
    let backend = Pollinations::with_url(server.url());
    let err = backend
        .generate_image(&ImageRequest::new("a red fox"), &dest)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "HTTP 429: Too Many Requests");
    assert!(!dest.exists());
}
