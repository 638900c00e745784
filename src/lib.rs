//! Validates live HTTP traffic against Swagger/OpenAPI 2.0 contracts.
//!
//! ```ignore
//! use live_validator::{LiveValidator, config::ValidatorConfig, validation::ValidateOptions};
//!
//! let validator = LiveValidator::new(ValidatorConfig {
//!     directory: "specification".into(),
//!     ..Default::default()
//! });
//! validator.initialize().await?;
//! let result = validator
//!     .validate_live_request_response(&pair, &ValidateOptions::default())
//!     .await;
//! ```

pub mod compiler;
pub mod config;
mod live;
pub mod observability;
pub mod routing;
pub mod swagger;
#[cfg(test)]
mod tests;
pub mod transform;
pub mod validation;

pub use live::{InitializeSummary, LiveValidator, RequestTarget};
