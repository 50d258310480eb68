use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{LookupError, model::Weather};

use super::{WeatherProvider, execute};

/// Current-weather lookup against a WeatherAPI.com-compatible endpoint.
#[derive(Clone)]
pub struct WeatherApiProvider {
    endpoint: String,
    api_key: String,
    language: String,
    http: Client,
}

impl WeatherApiProvider {
    /// `endpoint` is the full current-conditions URL, e.g.
    /// `http://api.weatherapi.com/v1/current.json`; key, location and
    /// language travel as query parameters.
    pub fn new(endpoint: String, api_key: String, language: String) -> Self {
        Self::with_client(endpoint, api_key, language, Client::new())
    }

    pub fn with_client(endpoint: String, api_key: String, language: String, http: Client) -> Self {
        Self { endpoint, api_key, language, http }
    }
}

impl fmt::Debug for WeatherApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherApiProvider")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaError,
}

#[derive(Debug, Deserialize)]
struct WaError {
    code: i64,
}

/// Classify a 400 body through the provider's error-code table.
fn bad_request_error(body: &[u8]) -> LookupError {
    serde_json::from_slice::<WaErrorResponse>(body)
        .map(|parsed| LookupError::from_weather_code(parsed.error.code))
        .unwrap_or(LookupError::UnexpectedBadRequest)
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn get_weather(&self, location: &str) -> Result<Weather, LookupError> {
        let request = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", location),
                ("lang", self.language.as_str()),
            ])
            .build()
            .map_err(LookupError::CreateRequest)?;

        let (status, body) = execute(&self.http, request).await?;

        if status == StatusCode::BAD_REQUEST {
            return Err(bad_request_error(&body));
        }
        if !status.is_success() {
            return Err(LookupError::UnexpectedStatusCode(status.as_u16()));
        }

        Weather::from_json(&body)
    }
}
