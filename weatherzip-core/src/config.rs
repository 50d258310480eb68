use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::provider::viacep::CEP_PLACEHOLDER;

/// Service configuration.
///
/// Read either from the environment (with an optional `.env` file next to the
/// binary) or from a TOML file using the same field names:
///
/// ```toml
/// web_server_port = "8080"
/// cep_api_url = "https://viacep.com.br/ws/{cep}/json/"
/// weather_api_url = "http://api.weatherapi.com/v1/current.json"
/// weather_api_key = "..."
/// weather_language = "pt"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `8080` or `:8080`.
    #[serde(default)]
    pub web_server_port: String,
    /// Location lookup URL template; `{cep}` is replaced by the postal code.
    #[serde(default)]
    pub cep_api_url: String,
    /// Current-weather endpoint.
    #[serde(default)]
    pub weather_api_url: String,
    #[serde(default)]
    pub weather_api_key: String,
    #[serde(default)]
    pub weather_language: String,
}

const KEYS: [&str; 5] =
    ["WEB_SERVER_PORT", "CEP_API_URL", "WEATHER_API_URL", "WEATHER_API_KEY", "WEATHER_LANGUAGE"];

impl Config {
    /// Load `.env` (if any) into the process environment, then read it.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err).context("Failed to load .env file"),
        }

        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build from any key/value source using the environment variable names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let [port, cep, weather, key, language] =
            KEYS.map(|name| lookup(name).unwrap_or_default());

        Self {
            web_server_port: port,
            cep_api_url: cep,
            weather_api_url: weather,
            weather_api_key: key,
            weather_language: language,
        }
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Every setting is required; the error lists all of the missing ones.
    pub fn validate(&self) -> Result<()> {
        let values = [
            &self.web_server_port,
            &self.cep_api_url,
            &self.weather_api_url,
            &self.weather_api_key,
            &self.weather_language,
        ];

        let missing: Vec<&str> = KEYS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();

        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }

        let port = self.web_server_port.trim().trim_start_matches(':');
        port.parse::<u16>()
            .with_context(|| format!("Invalid WEB_SERVER_PORT '{}'", self.web_server_port))?;

        if !self.cep_api_url.contains(CEP_PLACEHOLDER) {
            bail!(
                "Invalid CEP_API_URL '{}': missing {CEP_PLACEHOLDER} placeholder",
                self.cep_api_url
            );
        }

        Ok(())
    }

    /// Socket address the web server binds to.
    pub fn listen_address(&self) -> String {
        format!("0.0.0.0:{}", self.web_server_port.trim().trim_start_matches(':'))
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let masked = if self.weather_api_key.is_empty() { String::new() } else { "***".into() };
        Self { weather_api_key: masked, ..self.clone() }
    }
}
