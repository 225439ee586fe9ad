//! SpendWatch Core — domain types, allowlist, configuration and the data layer.
//!
//! This crate contains everything an ingestion cycle needs:
//! - Typed transaction records (`Transaction`, `EntityCode`, `TransDate`)
//! - The entity allowlist, loaded from TOML
//! - Application configuration
//! - The spending API source, projection/filtering, and the CSV store

pub mod allowlist;
pub mod config;
pub mod data;
pub mod domain;

pub use allowlist::{Allowlist, AllowlistError};
pub use config::{AppConfig, ConfigError};
