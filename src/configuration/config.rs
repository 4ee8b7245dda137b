#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::ConnectorName;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Desculpe, houve um erro temporário. Tente novamente em alguns minutos.";

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    BackendURL,
    BackendTimeout,
    ConfigFile,
    Connector,
    FallbackMessage,
    GatewayTimeout,
    GatewayToken,
    GatewayURL,
    Host,
    InitRetryDelay,
    Instance,
    LogFormat,
    Port,
    ReconnectDelay,
    WebhookURL,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    /// Reads a millisecond value. Values are validated on load, so a bad one
    /// here means it was never loaded.
    pub fn get_duration(key: ConfigKey) -> Result<Duration> {
        let millis = Config::get(key).parse::<u64>()?;
        return Ok(Duration::from_millis(millis));
    }

    pub fn default(key: ConfigKey) -> String {
        let default_connector = ConnectorName::Evolution.to_string();

        let config_path = dirs::config_dir()
            .unwrap_or_else(|| return env::temp_dir())
            .join("whatsapp-relay/config.toml");

        let res: &str = match key {
            ConfigKey::BackendURL => "http://localhost:8000",
            ConfigKey::BackendTimeout => "30000",
            ConfigKey::Connector => &default_connector,
            ConfigKey::FallbackMessage => DEFAULT_FALLBACK_MESSAGE,
            ConfigKey::GatewayTimeout => "10000",
            ConfigKey::GatewayToken => "",
            ConfigKey::GatewayURL => "http://localhost:8080",
            ConfigKey::Host => "0.0.0.0",
            ConfigKey::InitRetryDelay => "10000",
            ConfigKey::Instance => "whatsapp-service",
            ConfigKey::LogFormat => "text",
            ConfigKey::Port => "3001",
            ConfigKey::ReconnectDelay => "5000",

            // Special
            ConfigKey::ConfigFile => return config_path.to_string_lossy().to_string(),
            ConfigKey::WebhookURL => "",
        };

        return res.to_string();
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            Config::load_toml(&cmd, &toml_str)?;
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        Config::finalize()?;

        return Ok(());
    }

    fn load_toml(cmd: &Command, toml_str: &str) -> Result<()> {
        let doc = toml_str.parse::<toml_edit::Document>()?;

        for key in ConfigKey::iter() {
            let val = match doc.get(&key.to_string()) {
                Some(val) => val,
                None => continue,
            };

            // Use clap value parsers to do validation.
            let possible_values = cmd
                .get_arguments()
                .find(|e| return e.get_long() == Some(key.to_string().as_str()))
                .map(|arg| {
                    return arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name().to_string())
                        .collect::<Vec<String>>();
                })
                .unwrap_or_default();

            if let Some(val_int) = val.as_integer() {
                Config::set(key, &val_int.to_string());
            } else if let Some(val_str) = val.as_str() {
                if val_str.is_empty() {
                    continue;
                }
                if !possible_values.is_empty() && !possible_values.contains(&val_str.to_string())
                {
                    bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                }
                Config::set(key, val_str);
            }
        }

        return Ok(());
    }

    /// Validates numeric keys and fills in values derived from other keys.
    fn finalize() -> Result<()> {
        let port = Config::get(ConfigKey::Port);
        if port.parse::<u16>().is_err() {
            bail!(format!("Invalid port '{port}'"));
        }

        for key in [
            ConfigKey::BackendTimeout,
            ConfigKey::GatewayTimeout,
            ConfigKey::InitRetryDelay,
            ConfigKey::ReconnectDelay,
        ] {
            let val = Config::get(key);
            if val.parse::<u64>().is_err() {
                bail!(format!(
                    "Invalid value for '{key}': {val} is not a number of milliseconds"
                ));
            }
        }

        if Config::get(ConfigKey::WebhookURL).is_empty() {
            Config::set(
                ConfigKey::WebhookURL,
                &format!("http://127.0.0.1:{port}/webhook"),
            );
        }

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|e| return e.to_string())
                    .unwrap_or_default()
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
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

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() {
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

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
