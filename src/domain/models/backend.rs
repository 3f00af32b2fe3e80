#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use std::path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use rand::Rng;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Author;
use super::Balance;
use super::Message;
use super::ModelInfo;
use super::ModelKind;
use super::StreamError;
use super::Usage;

const MAX_RANDOM_SEED: u64 = 1_000_000;

/// Raw body segments as they come off the socket. Boundaries carry no meaning.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One piece of a multi-part message, tagged the way vision models expect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Plain text for ordinary turns, parts once images are attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> ChatMessage {
        return ChatMessage {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
        };
    }

    /// A text turn followed by one `image_url` part per image.
    pub fn with_images(role: &str, text: &str, image_urls: &[String]) -> ChatMessage {
        if image_urls.is_empty() {
            return ChatMessage::new(role, text);
        }

        let mut parts = vec![ContentPart::Text {
            text: text.to_string(),
        }];
        parts.extend(image_urls.iter().map(|url| {
            return ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            };
        }));

        return ChatMessage {
            role: role.to_string(),
            content: MessageContent::Parts(parts),
        };
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> ChatMessage {
        return ChatMessage::new(message.author.role(), &message.text);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendPrompt {
    pub text: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub stream: bool,
    pub history: Vec<ChatMessage>,
    /// Image URLs, data URLs included, sent along with `text`.
    pub attachments: Vec<String>,
}

impl BackendPrompt {
    pub fn new(text: &str, model: &str) -> BackendPrompt {
        return BackendPrompt {
            text: text.to_string(),
            model: model.to_string(),
            system_prompt: None,
            temperature: 1.0,
            max_tokens: None,
            json_mode: false,
            stream: true,
            history: vec![],
            attachments: vec![],
        };
    }

    /// Carries prior turns so the model sees the whole conversation.
    pub fn with_history(mut self, messages: &[Message]) -> BackendPrompt {
        self.history = messages
            .iter()
            .filter(|message| return message.author != Author::Pollen && !message.is_error())
            .map(ChatMessage::from)
            .collect();

        return self;
    }

    /// System prompt first, then history, then the new user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = vec![];
        if let Some(system_prompt) = &self.system_prompt {
            if !system_prompt.trim().is_empty() {
                messages.push(ChatMessage::new("system", system_prompt));
            }
        }

        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::with_images(
            Author::User.role(),
            &self.text,
            &self.attachments,
        ));

        return messages;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub negative_prompt: Option<String>,
    pub reference_image: Option<String>,
    pub enhance: bool,
    pub safe: bool,
    pub duration: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub audio: bool,
}

impl ImageRequest {
    pub fn new(prompt: &str) -> ImageRequest {
        return ImageRequest {
            prompt: prompt.to_string(),
            model: "flux".to_string(),
            width: 1024,
            height: 1024,
            seed: 0,
            negative_prompt: Some("worst quality, blurry".to_string()),
            reference_image: None,
            enhance: false,
            safe: false,
            duration: None,
            aspect_ratio: None,
            audio: false,
        };
    }

    pub fn kind(&self) -> ModelKind {
        return ModelKind::classify_media(&self.model);
    }

    pub fn randomize_seed(&mut self) {
        self.seed = rand::thread_rng().gen_range(0..MAX_RANDOM_SEED);
    }
}

#[async_trait]
pub trait Backend {
    /// Used at startup to verify the API is reachable with the configured
    /// credentials.
    async fn health_check(&self) -> Result<()>;

    /// Text, image, and video models the API offers.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Current account balance. Endpoints that do not report one yield
    /// `Balance::Unknown`.
    async fn balance(&self) -> Result<Balance>;

    /// Opens a streaming completion. Failing to connect or a non-success
    /// status is a transport error; the body is returned undecoded.
    async fn open_stream(&self, prompt: &BackendPrompt) -> Result<ChunkStream, StreamError>;

    /// Requests a completion in one piece.
    async fn complete(&self, prompt: &BackendPrompt) -> Result<Completion>;

    /// Generates an image or video and writes it to `dest`.
    async fn generate_image(&self, req: &ImageRequest, dest: &path::Path) -> Result<u64>;
}

pub type SharedBackend = Arc<dyn Backend + Send + Sync>;
