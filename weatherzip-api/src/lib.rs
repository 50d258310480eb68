//! HTTP surface of the `weatherzip` service.
//!
//! - [`server::WebServer`]: handler registry, lifecycle and graceful stop
//! - [`middleware`]: response recorder and failed-request logging
//! - [`handler`] and [`routes`]: the `/weather/{cep}`, `/health` and `/` endpoints
//! - [`logging`]: tracing subscriber setup for the binary

pub mod handler;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod server;
