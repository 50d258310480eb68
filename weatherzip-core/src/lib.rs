//! Core library for the `weatherzip` service.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - Location and weather provider adapters
//! - The CEP-to-weather use case and its error taxonomy
//! - Host health probes
//!
//! It is used by `weatherzip-api`, but has no HTTP-server dependency of its own.

pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod provider;
pub mod usecase;

pub use config::Config;
pub use error::{LocationField, LookupError, ProbeError};
pub use health::{HealthCheck, HealthCheckUseCase, HealthStats, HealthStatus};
pub use model::{Location, Weather};
pub use provider::{LocationProvider, WeatherProvider, providers_from_config};
pub use usecase::{WeatherByCep, WeatherByCepUseCase, is_valid_cep};
