mod cleanup;
mod connector;
mod engine;
mod error;
mod locks;
mod mapping;
mod progress;
pub mod rules;
mod scheduler;
pub mod stats;
mod sync;
mod unsubscribe;

pub use cleanup::{
    archive_and_verify, AffectedMessage, ArchivePolicy, CleanupExecutor, CleanupFailure,
    CleanupOutcome, CleanupRequest, CleanupStatus, RestorePlacement, TrashOutcome,
};
pub use connector::{KeychainConnector, RemoteConnector};
pub use engine::SweepEngine;
pub use error::EngineError;
pub use locks::UserLocks;
pub use mapping::{parse_header_date, strip_nulls};
pub use progress::{ProgressHandle, ProgressTracker};
pub use scheduler::{due_slot, AutomationScheduler, TickSummary};
pub use sync::{SyncCoordinator, SyncReport, SyncSettings};
pub use unsubscribe::{parse_list_unsubscribe, UnsubscribeOutcome, UnsubscribeTargets};
