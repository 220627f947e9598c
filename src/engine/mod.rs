//! Run engine: step state machine, run aggregate and undo history.
//!
//! Everything here is synchronous and free of I/O. The session layer wraps a
//! [`RunState`] in a shared mutex and persists it through a checkpoint store.

mod error;
pub mod history;
pub mod machine;
mod state;
mod view;

pub use error::EngineError;
pub use history::{Change, Command, CommandHistory};
pub use machine::can_transition;
pub use state::{PendingCheckpoint, RunState, StepChange};
pub use view::{RunView, SaveStatus};
