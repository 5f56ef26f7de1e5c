//! # imageleuth common library
//!
//! Shared code for the imageleuth services:
//! - Error type used by storage and configuration layers
//! - Configuration loading and root folder resolution
//! - Timestamp and identifier helpers

pub mod config;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
