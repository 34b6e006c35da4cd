pub mod error;
pub mod models;
pub mod pacing;
pub mod report;
pub mod session;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{AppError, ExtractError};
pub use models::{
    AppendOutcome, Checkpoint, Identity, ItemTally, Record, SessionOutcome, SessionStatus,
};
pub use pacing::{PacingConfig, PacingPolicy};
pub use report::{SessionEvent, StatusReporter, TracingReporter};
pub use session::{SessionConfig, SessionController};
pub use traits::{ExtractionAdapter, PageSource, ProgressStore, RecordSink};
