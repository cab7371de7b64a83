//! Core components, types, and utilities for the chat relay bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The relay error taxonomy.
//! - User-visible fallback messages.
//! - Common types and result handling.

pub mod config;
pub mod error;
pub mod messages;
pub mod types;
