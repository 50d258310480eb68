use axum::{extract::Path, http::Method};

use crate::{
    handler::{HealthHandler, WeatherHandler, root},
    server::WebServer,
};

pub const WEATHER_PATH: &str = "/weather/{cep}";
pub const HEALTH_PATH: &str = "/health";
pub const ROOT_PATH: &str = "/";

/// Attach the service endpoints to `server`.
pub fn register_routes(server: &mut WebServer, weather: WeatherHandler, health: HealthHandler) {
    server.add_handler(WEATHER_PATH, Method::GET, move |Path(cep): Path<String>| {
        let weather = weather.clone();
        async move { weather.get_weather_by_cep(&cep).await }
    });

    server.add_handler(HEALTH_PATH, Method::GET, move || {
        let health = health.clone();
        async move { health.get_health().await }
    });

    server.add_handler(ROOT_PATH, Method::GET, root);
}
