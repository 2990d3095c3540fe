//! Motion Common
//!
//! Wire protocol, configuration, and error types shared by `motion_server`
//! and `motion_supervisor`.
//!
//! # Module Structure
//!
//! - [`wire`] - binary message framing, typed request/reply bodies
//! - [`result_code`] - reply result/subcode enums and packing helpers
//! - [`config`] - TOML configuration loading and validation
//! - [`error`] - shared error types
//! - [`consts`] - numeric limits and protocol constants

pub mod config;
pub mod consts;
pub mod error;
pub mod result_code;
pub mod wire;
