//! Library crate for fairway-back, exposing modules for binaries and integration tests.

mod auth;
mod codes;
mod config;
mod dto;
mod error;
mod jobs;
mod limits;
mod media;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
mod telemetry;
mod tokens;
