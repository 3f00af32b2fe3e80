use std::env;

use anyhow::Result;
use tokio::fs;
use uuid::Uuid;

use super::load;
use super::load_all;

#[tokio::test]
async fn it_passes_urls_through() -> Result<()> {
    let urls = load_all(&[
        "https://example.com/cat.png".to_string(),
        "data:image/png;base64,iVBORw==".to_string(),
    ])
    .await?;

    assert_eq!(
        urls,
        vec!["https://example.com/cat.png", "data:image/png;base64,iVBORw=="]
    );

    return Ok(());
}

#[tokio::test]
async fn it_inlines_local_images() -> Result<()> {
    let file = env::temp_dir().join(format!("pollen-{}.PNG", Uuid::new_v4()));
    fs::write(&file, [0x89, b'P', b'N', b'G']).await?;

    let url = load(&file.to_string_lossy()).await?;
    fs::remove_file(&file).await?;

    assert_eq!(url, "data:image/png;base64,iVBORw==");

    return Ok(());
}

#[tokio::test]
async fn it_rejects_files_that_are_not_images() {
    let err = load("notes.txt").await.unwrap_err();
    assert!(err.to_string().starts_with("Cannot attach notes.txt"));
}

#[tokio::test]
async fn it_fails_on_missing_files() {
    let file = env::temp_dir().join(format!("pollen-{}.jpg", Uuid::new_v4()));
    let err = load(&file.to_string_lossy()).await.unwrap_err();

    assert!(err.to_string().starts_with("Attachment not found at"));
}
