#[cfg(test)]
#[path = "settings_store_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::models::Settings;

pub struct SettingsStore {
    pub settings_dir: path::PathBuf,
}

impl SettingsStore {
    pub fn new(settings_dir: path::PathBuf) -> SettingsStore {
        return SettingsStore { settings_dir };
    }

    pub fn file_path(&self) -> path::PathBuf {
        return self.settings_dir.join("settings.json");
    }

    /// Missing or unreadable settings fall back to the defaults.
    pub async fn load(&self) -> Settings {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Settings::default();
        }

        let payload = match fs::read_to_string(&file_path).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = ?err, path = ?file_path, "Failed to read settings");
                return Settings::default();
            }
        };

        match serde_json::from_str::<Settings>(&payload) {
            Ok(settings) => return settings,
            Err(err) => {
                tracing::warn!(error = ?err, path = ?file_path, "Ignoring corrupt settings");
                return Settings::default();
            }
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        write_json(&self.file_path(), settings).await?;
        return Ok(());
    }

    pub async fn reset(&self) -> Result<Settings> {
        let settings = Settings::default();
        self.save(&settings).await?;

        return Ok(settings);
    }

    /// Writes the current settings to `dest` with the API key stripped.
    pub async fn export_to(&self, dest: &path::Path) -> Result<()> {
        let settings = self.load().await.exported();
        write_json(dest, &settings).await?;

        return Ok(());
    }

    /// Merges the keys found in `src` over the current settings and saves
    /// the result. Nothing is written when the file is not a valid settings
    /// object.
    pub async fn import_from(&self, src: &path::Path) -> Result<Settings> {
        let payload = fs::read_to_string(src).await?;
        let imported: serde_json::Value = match serde_json::from_str(&payload) {
            Ok(imported) => imported,
            Err(_) => bail!("Failed to import settings: Invalid format"),
        };

        let mut settings = self.load().await;
        settings.merge(&imported)?;
        self.save(&settings).await?;

        return Ok(settings);
    }
}

async fn write_json(dest: &path::Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let payload = serde_json::to_string_pretty(settings)?;
    let mut file = fs::File::create(dest).await?;
    file.write_all(payload.as_bytes()).await?;
    file.flush().await?;

    return Ok(());
}
