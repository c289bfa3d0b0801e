//! Extraction core: pure job model, result assembly and snapshot state machine.
mod assemble;
mod event;
mod handle;
mod result;
mod snapshot;

pub use assemble::{apply, AssemblyError};
pub use event::{FailureReason, ProgressEvent};
pub use handle::{JobHandle, JobId};
pub use result::{ExtractionResult, ResultFragment, ResultTier};
pub use snapshot::{update, JobSnapshot, JobState, ProgressPoint};
