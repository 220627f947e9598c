//! Domain types for runs, steps, sessions and share projections.
//!
//! These types derive ts-rs so the browser client consumes the same shapes
//! the engine persists.

mod run;
mod session;
mod share;
mod step;

pub use run::{progress_percent, Run, RunSnapshot, RunStatus};
pub use session::{
    CheckpointType, Session, SessionData, SessionStatus, SessionSummary, UiState, ViewMode,
};
pub use share::ShareSnapshot;
pub use step::{Step, StepStatus, StepType};
