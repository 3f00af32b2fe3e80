#[cfg(test)]
#[path = "attachments_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use tokio::fs;

const URL_PREFIXES: [&str; 3] = ["http://", "https://", "data:"];

fn image_mime_type(file: &path::Path) -> Option<&'static str> {
    let extension = file.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "png" => return Some("image/png"),
        "jpg" | "jpeg" => return Some("image/jpeg"),
        "gif" => return Some("image/gif"),
        "webp" => return Some("image/webp"),
        _ => return None,
    }
}

/// Resolves an attachment given as a URL or a local image path into a URL
/// the API accepts. Local files are inlined as base64 data URLs.
pub async fn load(source: &str) -> Result<String> {
    if URL_PREFIXES.iter().any(|prefix| return source.starts_with(prefix)) {
        return Ok(source.to_string());
    }

    let file = path::PathBuf::from(source);
    let mime_type = match image_mime_type(&file) {
        Some(mime_type) => mime_type,
        None => bail!(
            "Cannot attach {source}: only PNG, JPEG, GIF and WebP images or image URLs are supported"
        ),
    };
    if !file.exists() {
        bail!("Attachment not found at {source}");
    }

    let bytes = fs::read(&file).await?;
    tracing::debug!(source, mime_type, size = bytes.len(), "Attached image");

    return Ok(format!("data:{mime_type};base64,{}", b64.encode(bytes)));
}

pub async fn load_all(sources: &[String]) -> Result<Vec<String>> {
    let mut urls = vec![];
    for source in sources {
        urls.push(load(source).await?);
    }

    return Ok(urls);
}
