pub mod pollinations;

use std::sync::Arc;

use anyhow::Result;

use crate::configuration::Config;
use crate::domain::models::Settings;
use crate::domain::models::SharedBackend;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(config: &Config, settings: &Settings) -> Result<SharedBackend> {
        let backend = pollinations::Pollinations::from_config(config, &settings.api_key)?;
        return Ok(Arc::new(backend));
    }
}
