//! Security module - Keeps user data out of the logs
//!
//! This module provides:
//! - URL stripping for navigation logs
//! - Prompt truncation for injection logs

mod sanitizer;

pub use sanitizer::Sanitizer;
