//! Business services for the web crate.

pub mod diagnostics;
pub mod funnel;
pub mod outbox;
pub mod staging;

pub use funnel::{Completion, FunnelError, FunnelService, UploadReport, WriteOutcome};
pub use outbox::{Outbox, OutboxError, OutboxStats};
pub use staging::{PhotoStaging, StagingError};
