use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    LookupError,
    model::Weather,
    provider::{LocationProvider, WeatherProvider},
};

/// Length of a Brazilian postal code, digits only.
pub const CEP_LENGTH: usize = 8;

/// Current weather for the city a postal code belongs to.
#[async_trait]
pub trait WeatherByCep: Send + Sync {
    async fn weather_by_cep(&self, cep: &str) -> Result<Weather, LookupError>;
}

pub fn is_valid_cep(cep: &str) -> bool {
    cep.len() == CEP_LENGTH && cep.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone)]
pub struct WeatherByCepUseCase {
    locations: Arc<dyn LocationProvider>,
    weather: Arc<dyn WeatherProvider>,
}

impl WeatherByCepUseCase {
    pub fn new(locations: Arc<dyn LocationProvider>, weather: Arc<dyn WeatherProvider>) -> Self {
        Self { locations, weather }
    }
}

#[async_trait]
impl WeatherByCep for WeatherByCepUseCase {
    /// Errors from either provider come back exactly as the provider raised them.
    async fn weather_by_cep(&self, cep: &str) -> Result<Weather, LookupError> {
        if !is_valid_cep(cep) {
            return Err(LookupError::InvalidZipcode);
        }

        let location = self.locations.get_location(cep).await?;
        tracing::debug!(cep, city = %location.city, "resolved postal code");

        self.weather.get_weather(&location.city).await
    }
}
