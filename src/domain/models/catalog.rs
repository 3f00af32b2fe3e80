use serde_derive::Deserialize;
use serde_derive::Serialize;

const VIDEO_MODELS: [&str; 2] = ["veo", "seedance"];

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
pub enum ModelKind {
    Text,
    Image,
    Video,
}

impl ModelKind {
    /// Entries of the image catalog double as video models when their name
    /// says so.
    pub fn classify_media(name: &str) -> ModelKind {
        let lower = name.to_lowercase();
        if lower.contains("video") || VIDEO_MODELS.contains(&lower.as_str()) {
            return ModelKind::Video;
        }

        return ModelKind::Image;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub kind: ModelKind,
    pub description: Option<String>,
}

impl ModelInfo {
    pub fn new(id: &str, kind: ModelKind) -> ModelInfo {
        return ModelInfo {
            id: id.to_string(),
            kind,
            description: None,
        };
    }
}
