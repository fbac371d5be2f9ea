//! Measurement orchestration
//!
//! Ties the audio path together behind a thread-safe facade:
//! - Tunables and their bounds ([`config`])
//! - Result records and failure reasons ([`result`])
//! - Host boundary traits ([`source`])
//! - Result hand-off to presentation threads ([`notify`])
//! - The [`engine::DelayMeter`] itself ([`engine`])

pub mod config;
pub mod engine;
pub mod notify;
pub mod result;
pub mod source;
