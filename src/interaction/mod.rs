//! Event handling and user interactions for the relay bot.
//!
//! An inbound event flows through these stages:
//! - `dispatch` validates it and queues a relay task
//! - `relay` calls the backend and paces the reply out
//! - `normalize` turns the backend's answer into outbound fragments

pub mod dispatch;
pub mod normalize;
pub mod relay;
