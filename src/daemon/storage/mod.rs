//! Local persistence of the tracker.
//!  - [tracking_log::JsonTrackingLog] keeps the tracking record inside the git working tree. It is
//!    append only: sessions are never reordered or changed once written.
//!  - [state_store::StateStore] keeps the token and the session timestamps needed to resume after
//!    a restart. It never gets committed.

pub mod entities;
pub mod state_store;
pub mod tracking_log;
