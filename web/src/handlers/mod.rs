//! HTTP handlers shared by every Vidly deployment.

pub mod health;

pub use health::{health_check, readiness};
