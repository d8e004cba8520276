//! PodShare Sharing - grants and revocations as a saga over the policy
//! store, the replicated audit log and recipient inboxes.

#![deny(unsafe_code)]

pub mod cancel;
pub mod config;
mod error;
pub mod notify;
mod orchestrator;
pub mod telemetry;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use config::{LoggingConfig, SharingConfig};
pub use error::{NotificationError, SharingError};
pub use notify::NotificationDispatcher;
pub use orchestrator::{
    Inspection, RevokeRequest, SagaState, SagaStep, ShareRequest, ShareResult, ShareWarning,
    SharingOrchestrator,
};
