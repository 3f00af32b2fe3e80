#[cfg(test)]
#[path = "pollinations_test.rs"]
mod tests;

use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::StreamExt;
use futures::stream::TryStreamExt;
use reqwest::Url;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use tokio::fs;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendPrompt;
use crate::domain::models::Balance;
use crate::domain::models::ChatMessage;
use crate::domain::models::ChunkStream;
use crate::domain::models::Completion;
use crate::domain::models::ImageRequest;
use crate::domain::models::ModelInfo;
use crate::domain::models::ModelKind;
use crate::domain::models::StreamError;
use crate::domain::models::Usage;

/// Status codes that mean the deployment simply has no usage endpoint.
const BALANCE_UNSUPPORTED: [u16; 3] = [404, 405, 501];

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Model {
    id: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    data: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum MediaModel {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    fn new(prompt: &BackendPrompt, stream: bool) -> CompletionRequest {
        let mut response_format = None;
        if prompt.json_mode {
            response_format = Some(ResponseFormat {
                format_type: "json_object".to_string(),
            });
        }

        return CompletionRequest {
            model: prompt.model.to_string(),
            messages: prompt.messages(),
            stream,
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
            response_format,
        };
    }
}

/// Reads the most descriptive error the API gave, falling back to the status
/// reason.
async fn error_message(res: reqwest::Response) -> (u16, String) {
    let status = res.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();

    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            return json
                .pointer("/error/message")
                .or_else(|| return json.get("message"))
                .and_then(|message| return message.as_str())
                .map(|message| return message.to_string());
        })
        .unwrap_or(fallback);

    return (status.as_u16(), message);
}

pub struct Pollinations {
    url: String,
    token: String,
    timeout: Duration,
}

impl Pollinations {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Pollinations {
        return Pollinations {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        };
    }

    /// Builds the backend from configuration. An API key from the config
    /// layers wins over the one saved in settings.
    pub fn from_config(config: &Config, saved_token: &str) -> Result<Pollinations> {
        let mut token = config.get(ConfigKey::ApiKey);
        if token.is_empty() {
            token = saved_token.to_string();
        }

        return Ok(Pollinations::new(
            &config.get(ConfigKey::ApiUrl),
            &token,
            config.health_check_timeout()?,
        ));
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = reqwest::Client::new().request(method, format!("{}{path}", self.url));
        if !self.token.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.token));
        }

        return req;
    }

    async fn text_models(&self) -> Result<Vec<ModelInfo>> {
        let res = self
            .request(reqwest::Method::GET, "/v1/models")
            .send()
            .await?
            .error_for_status()?
            .json::<ModelListResponse>()
            .await?;

        return Ok(res
            .data
            .iter()
            .map(|model| return ModelInfo::new(&model.id, ModelKind::Text))
            .collect());
    }

    async fn media_models(&self) -> Result<Vec<ModelInfo>> {
        let res = self
            .request(reqwest::Method::GET, "/image/models")
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<MediaModel>>()
            .await?;

        return Ok(res
            .iter()
            .map(|model| {
                let (name, description) = match model {
                    MediaModel::Name(name) => (name, None),
                    MediaModel::Detailed { name, description } => (name, description.clone()),
                };

                let mut info = ModelInfo::new(name, ModelKind::classify_media(name));
                info.description = description;
                return info;
            })
            .collect());
    }

    /// The GET URL that renders `req`. The prompt is a path segment; video
    /// options are only sent for video models.
    pub fn image_url(&self, req: &ImageRequest) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push("image").push(&req.prompt);
            }
            Err(_) => bail!("API URL {} cannot be used as a base", self.url),
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("model", &req.model)
                .append_pair("width", &req.width.to_string())
                .append_pair("height", &req.height.to_string())
                .append_pair("seed", &req.seed.to_string());

            if let Some(negative_prompt) = &req.negative_prompt {
                if !negative_prompt.is_empty() {
                    query.append_pair("negative_prompt", negative_prompt);
                }
            }
            if req.enhance {
                query.append_pair("enhance", "true");
            }
            if req.safe {
                query.append_pair("safe", "true");
            }
            if let Some(reference_image) = &req.reference_image {
                query.append_pair("image", reference_image);
            }

            if req.kind() == ModelKind::Video {
                if let Some(duration) = req.duration {
                    query.append_pair("duration", &duration.to_string());
                }
                if let Some(aspect_ratio) = &req.aspect_ratio {
                    query.append_pair("aspectRatio", aspect_ratio);
                }
                if req.audio {
                    query.append_pair("audio", "true");
                }
            }
        }

        return Ok(url);
    }
}

#[async_trait]
impl Backend for Pollinations {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Pollinations URL is not defined");
        }

        let res = self
            .request(reqwest::Method::GET, "/v1/models")
            .timeout(self.timeout)
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Pollinations is not reachable");
                bail!("Pollinations is not reachable at {}", self.url);
            }
        };

        let status = res.status().as_u16();
        if status == 401 || status == 403 {
            tracing::error!(status = status, "Pollinations rejected the API key");
            bail!("Pollinations rejected the API key (HTTP {status})");
        }
        if status >= 400 {
            tracing::error!(status = status, "Pollinations health check failed");
            bail!("Pollinations health check failed (HTTP {status})");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let (text, media) = tokio::join!(self.text_models(), self.media_models());

        let mut models: Vec<ModelInfo> = vec![];
        let mut last_err = None;
        for res in [text, media] {
            match res {
                Ok(list) => models.extend(list),
                Err(err) => {
                    tracing::warn!(error = ?err, "Failed to load a model catalog");
                    last_err = Some(err);
                }
            }
        }

        if models.is_empty() {
            if let Some(err) = last_err {
                return Err(err);
            }
        }

        return Ok(models);
    }

    #[allow(clippy::implicit_return)]
    async fn balance(&self) -> Result<Balance> {
        let res = self.request(reqwest::Method::GET, "/usage").send().await?;
        let status = res.status().as_u16();

        if BALANCE_UNSUPPORTED.contains(&status) {
            tracing::debug!(status = status, "Usage endpoint is not available");
            return Ok(Balance::Unknown);
        }
        if !res.status().is_success() {
            let (status, message) = error_message(res).await;
            bail!("Failed to fetch balance (HTTP {status}): {message}");
        }

        match res.json::<Value>().await {
            Ok(body) => return Ok(Balance::from_value(&body)),
            Err(err) => {
                tracing::warn!(error = ?err, "Usage endpoint returned a non JSON body");
                return Ok(Balance::Unknown);
            }
        }
    }

    #[allow(clippy::implicit_return)]
    async fn open_stream(&self, prompt: &BackendPrompt) -> Result<ChunkStream, StreamError> {
        let req = CompletionRequest::new(prompt, true);
        let res = self
            .request(reqwest::Method::POST, "/v1/chat/completions")
            .header("Accept", "text/event-stream")
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            let (status, message) = error_message(res).await;
            tracing::error!(
                status = status,
                message = message.as_str(),
                "Failed to open completion stream"
            );
            return Err(StreamError::status(status, message));
        }

        let stream = res
            .bytes_stream()
            .map_ok(|chunk| return chunk.to_vec())
            .map_err(StreamError::from)
            .boxed();

        return Ok(stream);
    }

    #[allow(clippy::implicit_return)]
    async fn complete(&self, prompt: &BackendPrompt) -> Result<Completion> {
        let req = CompletionRequest::new(prompt, false);
        let res = self
            .request(reqwest::Method::POST, "/v1/chat/completions")
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            let (status, message) = error_message(res).await;
            bail!(StreamError::status(status, message));
        }

        let body = res.json::<Value>().await?;
        tracing::debug!(body = ?body, "Completion response");

        let text = match body
            .pointer("/choices/0/message/content")
            .and_then(|content| return content.as_str())
        {
            Some(text) => text.to_string(),
            None => bail!("Completion response is missing choices[0].message.content"),
        };

        let usage = body
            .get("usage")
            .and_then(|usage| return serde_json::from_value::<Usage>(usage.clone()).ok());

        return Ok(Completion { text, usage });
    }

    #[allow(clippy::implicit_return)]
    async fn generate_image(&self, req: &ImageRequest, dest: &path::Path) -> Result<u64> {
        let url = self.image_url(req)?;
        tracing::debug!(url = url.as_str(), "Generating media");

        let mut builder = reqwest::Client::new().get(url);
        if !self.token.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.token));
        }

        let res = builder.send().await?;
        if !res.status().is_success() {
            let (status, message) = error_message(res).await;
            bail!("HTTP {status}: {message}");
        }

        let bytes = res.bytes().await?;
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(dest, &bytes).await?;

        return Ok(bytes.len() as u64);
    }
}
