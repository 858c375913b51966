//! Job pipeline for the MailSized backend.
//!
//! This crate owns everything between "payment confirmed" and "artifacts
//! purged":
//! - `registry` — the single synchronized store of jobs and their state machine
//! - `broadcast` — per-job progress fan-out with replay-of-last-state
//! - `engine` — the compression pipeline driving the external encoder
//! - `cleanup` — TTL-deferred, idempotent artifact deletion
//! - `mailer` — fire-and-forget completion notification

pub mod broadcast;
pub mod cleanup;
pub mod engine;
pub mod error;
pub mod mailer;
pub mod registry;

pub use broadcast::{EventBroadcaster, Subscription};
pub use cleanup::CleanupScheduler;
pub use engine::{CompressionEngine, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use mailer::{Mailer, MailerConfig};
pub use registry::{Confirmed, JobRegistry, JobTicket, StageUpdate};
