//! Sessions: recoverable bindings between a client and a run.
//!
//! A session owns the in-memory run state, autosaves it while the run is
//! running and can be resumed later from its last checkpoint with the
//! client-held session key.

mod autosave;
pub(crate) mod beacon;
pub(crate) mod checkpoint;
mod manager;

pub use autosave::AutosaveScheduler;
pub use beacon::{BeaconPayload, BeaconTransport, HttpBeacon, StoreBeacon, PAGE_UNLOAD};
pub use checkpoint::{Checkpointer, FlushOutcome, SharedRunState};
pub use manager::{generate_session_key, SessionInit, SessionManager};
