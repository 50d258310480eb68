use crate::{
    Config, LookupError,
    model::{Location, Weather},
    provider::{viacep::ViaCepProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use reqwest::{Client, Request, Response, StatusCode};
use std::{fmt::Debug, sync::Arc};

pub mod viacep;
pub mod weatherapi;

/// Resolves a postal code into an address.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn get_location(&self, cep: &str) -> Result<Location, LookupError>;
}

/// Fetches current conditions for a free-text location name.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn get_weather(&self, location: &str) -> Result<Weather, LookupError>;
}

/// Construct both upstream adapters from config, sharing one HTTP client.
pub fn providers_from_config(
    config: &Config,
) -> (Arc<dyn LocationProvider>, Arc<dyn WeatherProvider>) {
    let http = Client::new();

    let location: Arc<dyn LocationProvider> =
        Arc::new(ViaCepProvider::with_client(config.cep_api_url.clone(), http.clone()));
    let weather: Arc<dyn WeatherProvider> = Arc::new(WeatherApiProvider::with_client(
        config.weather_api_url.clone(),
        config.weather_api_key.clone(),
        config.weather_language.clone(),
        http,
    ));

    (location, weather)
}

/// Run a prepared request and read the whole body.
///
/// Both a failed send and a failed body read are transport failures.
pub(crate) async fn execute(
    http: &Client,
    request: Request,
) -> Result<(StatusCode, Vec<u8>), LookupError> {
    let url = request.url().clone();
    let response = http.execute(request).await.map_err(LookupError::MakeRequest)?;
    let status = response.status();
    let body = read_body(response).await?;

    tracing::debug!(%url, status = status.as_u16(), bytes = body.len(), "upstream responded");
    if !status.is_success() {
        tracing::debug!(%url, body = %truncate_body(&body), "upstream error body");
    }

    Ok((status, body))
}

async fn read_body(response: Response) -> Result<Vec<u8>, LookupError> {
    response.bytes().await.map(|body| body.to_vec()).map_err(LookupError::MakeRequest)
}

fn truncate_body(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.into_owned()
    }
}
