//! HTTP API exposing the generic resource pipeline

pub mod handlers;
pub mod routes;

pub use routes::create_router;
