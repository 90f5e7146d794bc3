//! Conversation kernel for a social-network companion bot
//!
//! Stream events are routed through installed modules; conversations waiting
//! for a reply and delayed callbacks are persisted so they survive restarts.

pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod kernel;
pub mod models;
pub mod modules;
pub mod platform;

#[cfg(test)]
mod testing;
