//! Service integrations for external APIs and clients.
//!
//! This module contains the pieces the relay talks to or runs on:
//! - The backend client (HTTP, with retry)
//! - Chat services (e.g., Slack)
//! - The bounded task pool
//! - A mock backend for local runs
//!
//! Clients define both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod backend;
pub mod chat;
pub mod mock_backend;
pub mod pool;
