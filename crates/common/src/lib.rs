//! Common utilities and types shared across room-recorder components.

#![warn(clippy::pedantic)]

/// Module for shared identifier types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
