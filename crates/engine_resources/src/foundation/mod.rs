//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Generational handles and handle-based storage
//! - Logging utilities

pub mod collections;
pub mod logging;
