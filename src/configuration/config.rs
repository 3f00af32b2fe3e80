#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::collections::HashMap;
use std::env;
use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::application::views::ViewName;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ApiKey,
    ApiUrl,
    ConfigFile,
    HealthCheckTimeout,
    Model,
    SettingsDir,
    View,
}

fn pollen_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base.unwrap_or_else(env::temp_dir).join("pollen");
}

/// Resolved settings for one run. Built from defaults, then the config file,
/// then flags and environment variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    values: HashMap<ConfigKey, String>,
}

impl Default for Config {
    fn default() -> Config {
        let mut config = Config {
            values: HashMap::new(),
        };
        for key in ConfigKey::iter() {
            config.set(key, &Config::default_value(key));
        }

        return config;
    }
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> String {
        if let Some(val) = self.values.get(&key) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) {
        self.values.insert(key, value.to_string());
    }

    pub fn default_value(key: ConfigKey) -> String {
        let config_path = pollen_dir(dirs::config_dir()).join("config.toml");
        let settings_dir = pollen_dir(dirs::config_dir());

        let res = match key {
            ConfigKey::ApiKey => "".to_string(),
            ConfigKey::ApiUrl => "https://gen.pollinations.ai".to_string(),
            ConfigKey::HealthCheckTimeout => "1000".to_string(),
            ConfigKey::Model => "".to_string(),
            ConfigKey::View => ViewName::Desktop.to_string(),

            // Paths
            ConfigKey::ConfigFile => config_path.to_string_lossy().to_string(),
            ConfigKey::SettingsDir => settings_dir.to_string_lossy().to_string(),
        };

        return res;
    }

    pub fn health_check_timeout(&self) -> Result<Duration> {
        let raw = self.get(ConfigKey::HealthCheckTimeout);
        match raw.parse::<u64>() {
            Ok(millis) => return Ok(Duration::from_millis(millis)),
            Err(_) => bail!("health-check-timeout must be a number of milliseconds, got '{raw}'"),
        }
    }

    pub fn view(&self) -> Result<ViewName> {
        let raw = self.get(ConfigKey::View);
        match raw.parse::<ViewName>() {
            Ok(view) => return Ok(view),
            Err(_) => bail!("Unknown view '{raw}'"),
        }
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<Config> {
        let mut config = Config::default();

        let mut config_file = config.get(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(&config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if key == ConfigKey::ConfigFile {
                    continue;
                }

                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let key_name = key.to_string();
                    let possible_values = cmd
                        .get_arguments()
                        .find(|e| return e.get_long() == Some(key_name.as_str()))
                        .map(|arg| {
                            return arg
                                .get_possible_values()
                                .iter()
                                .map(|e| return e.get_name().to_string())
                                .collect::<Vec<String>>();
                        })
                        .unwrap_or_default();

                    if let Some(val_int) = val.as_integer() {
                        config.set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                        }
                        config.set(key, val_str);
                    } else {
                        bail!(format!("config.toml has an invalid type for key '{key}'"));
                    }
                }
            }
        } else if config_file != config.get(ConfigKey::ConfigFile) {
            bail!(format!("Config file not found at {config_file}"));
        }
        config.set(ConfigKey::ConfigFile, &config_file);

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    config.set(key, val)
                }
            }
        }

        // Validate numbers up front rather than on first use.
        config.health_check_timeout()?;

        tracing::debug!(
            api_url = config.get(ConfigKey::ApiUrl).as_str(),
            config_file = config.get(ConfigKey::ConfigFile).as_str(),
            model = config.get(ConfigKey::Model).as_str(),
            settings_dir = config.get(ConfigKey::SettingsDir).as_str(),
            view = config.get(ConfigKey::View).as_str(),
            "config"
        );

        return Ok(config);
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let key_name = key.to_string();
                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key_name.as_str()))?;

                let mut description = arg.get_help()?.to_string();
                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default_value(key);
                if val.is_empty() || key == ConfigKey::SettingsDir {
                    val = format!("# {key} = \"{val}\"");
                } else if val.parse::<i32>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
