//! Route handlers grouped by resource.

pub mod health;
pub mod runs;
pub mod sessions;
pub mod shares;
