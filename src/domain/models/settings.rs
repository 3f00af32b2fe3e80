#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

/// User preferences persisted as a single JSON blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub default_model: String,
    pub theme: String,
    pub font_size: String,
    pub max_results: usize,
    pub auto_refresh_balance: bool,
    pub cache_duration: u32,
    pub content_filter: bool,
    pub clear_history: bool,
    pub auto_save_key: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        return Settings {
            api_key: "".to_string(),
            default_model: "openai".to_string(),
            theme: "auto".to_string(),
            font_size: "medium".to_string(),
            max_results: 20,
            auto_refresh_balance: true,
            cache_duration: 10,
            content_filter: true,
            clear_history: false,
            auto_save_key: true,
        };
    }
}

impl Settings {
    /// Overlays every key of `imported` on top of the current settings.
    /// Unknown keys are ignored; keys with the wrong type fail the whole
    /// merge and leave `self` untouched.
    pub fn merge(&mut self, imported: &Value) -> Result<()> {
        let overlay = match imported.as_object() {
            Some(overlay) => overlay,
            None => bail!("Failed to import settings: Invalid format"),
        };

        let mut current = serde_json::to_value(&*self)?;
        if let Some(fields) = current.as_object_mut() {
            for (key, value) in overlay {
                fields.insert(key.to_string(), value.clone());
            }
        }

        match serde_json::from_value::<Settings>(current) {
            Ok(merged) => {
                *self = merged;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Rejected imported settings");
                bail!("Failed to import settings: Invalid format");
            }
        }

        return Ok(());
    }

    /// A copy that is safe to hand out; the API key never leaves the machine.
    pub fn exported(&self) -> Settings {
        let mut settings = self.clone();
        settings.api_key = "".to_string();
        return settings;
    }
}
