//! # causerie-api
//!
//! Stateless REST client for the Causerie authentication and profile API.
//! The only per-request state is the bearer token, read from the persistent
//! session store; a 401 response clears the persisted session globally.

pub mod client;

mod error;

pub use client::{ApiClient, DEFAULT_API_URL};
pub use error::ApiError;
