use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode, header};
use serde::{Serialize, Serializer, ser::Error as _};
use weatherzip_core::{HealthCheck, LookupError, Weather, WeatherByCep};

use crate::middleware::ResponseRecorder;

/// Body of a successful `GET /weather/{cep}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureResponse {
    #[serde(rename = "temp_C", serialize_with = "finite_number")]
    pub temp_c: f64,
    #[serde(rename = "temp_F", serialize_with = "finite_number")]
    pub temp_f: f64,
    #[serde(rename = "temp_K", serialize_with = "finite_number")]
    pub temp_k: f64,
}

impl From<&Weather> for TemperatureResponse {
    fn from(weather: &Weather) -> Self {
        Self {
            temp_c: weather.current.temp_c,
            temp_f: weather.current.temp_f,
            temp_k: weather.current.temp_k,
        }
    }
}

// Whole values go out as integers (25, not 25.0); NaN and infinities are refused.
fn finite_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(S::Error::custom(format!("temperature {value} is not a finite number")));
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

#[derive(Clone)]
pub struct WeatherHandler {
    usecase: Arc<dyn WeatherByCep>,
}

impl WeatherHandler {
    pub fn new(usecase: Arc<dyn WeatherByCep>) -> Self {
        Self { usecase }
    }

    pub async fn get_weather_by_cep(&self, cep: &str) -> ResponseRecorder {
        let mut recorder = ResponseRecorder::new();

        let weather = match self.usecase.weather_by_cep(cep).await {
            Ok(weather) => weather,
            Err(err) => {
                lookup_failure(&mut recorder, &err);
                return recorder;
            }
        };

        // Encode before committing anything so a failure can still become a 500.
        match serde_json::to_vec(&TemperatureResponse::from(&weather)) {
            Ok(body) => {
                recorder
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                recorder.write_header(StatusCode::OK);
                recorder.write(&body);
            }
            Err(err) => {
                tracing::debug!(error = %err, "failed to encode temperatures");
                recorder.annotate_error("Internal server error");
                recorder.http_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
            }
        }

        recorder
    }
}

fn lookup_failure(recorder: &mut ResponseRecorder, err: &LookupError) {
    match err {
        LookupError::ZipcodeNotFound => {
            recorder.annotate_error("Zipcode not found");
            recorder.http_error(StatusCode::NOT_FOUND, "can not find zipcode");
        }
        LookupError::InvalidZipcode => {
            recorder.annotate_error("Invalid zipcode");
            recorder.http_error(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string());
        }
        other => {
            tracing::debug!(error = %other, "weather lookup failed");
            recorder.annotate_error("Internal server error");
            recorder.http_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    }
}

#[derive(Clone)]
pub struct HealthHandler {
    usecase: Arc<dyn HealthCheck>,
}

impl HealthHandler {
    pub fn new(usecase: Arc<dyn HealthCheck>) -> Self {
        Self { usecase }
    }

    pub async fn get_health(&self) -> ResponseRecorder {
        let mut recorder = ResponseRecorder::new();

        let body = self
            .usecase
            .health()
            .map_err(|err| err.to_string())
            .and_then(|stats| serde_json::to_vec(&stats).map_err(|err| err.to_string()));

        match body {
            Ok(body) => {
                recorder
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                recorder.write_header(StatusCode::OK);
                recorder.write(&body);
            }
            Err(message) => {
                recorder.annotate_error(format!("Health check failed: {message}"));
                recorder.http_error(StatusCode::INTERNAL_SERVER_ERROR, &message);
            }
        }

        recorder
    }
}

pub async fn root() -> &'static str {
    "Enjoy the silence!"
}
