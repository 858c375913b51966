//! HTTP handlers.

pub mod checkout;
pub mod download;
pub mod events;
pub mod health;
pub mod upload;

pub use checkout::checkout;
pub use download::{download, job_result};
pub use events::job_events;
pub use health::{health, ready};
pub use upload::upload_video;
