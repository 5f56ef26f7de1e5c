//! Test Helper Utilities
//!
//! Shared utilities for testing imageleuth-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod fixtures;

pub use db_utils::{count_rows, create_test_db};
pub use fixtures::{png_bytes, FaultyLedger, ScriptedRecognizer, SUCCESS_REPLY};
