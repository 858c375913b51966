//! Shared data models for the MailSized backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, providers and checkout upsells
//! - The job status state machine
//! - Tier/price calculation
//! - Progress event schemas for the SSE stream

pub mod event;
pub mod job;
pub mod pricing;
pub mod status;

// Re-export common types
pub use event::ProgressEvent;
pub use job::{Job, JobId, Provider, Upsells};
pub use pricing::{quote, tier_by_duration, tier_by_size, PricingError, Quote};
pub use status::JobStatus;
