//! Axum route handlers.

pub mod generations;
pub mod status;
pub mod uploads;
