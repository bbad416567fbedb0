//! Per-user conversation state with a transient cache.
//!
//! This crate tracks, for every user of a conversational application:
//! - the user's current state in a simple finite-state machine
//! - a cache of values gathered so far in the flow, including media groups
//!   accumulated one file at a time
//! - idle timers that let background reapers evict abandoned sessions
//!
//! Returning a user to [`State::DEFAULT`] wipes everything cached for them.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_fsm::{Fsm, FsmConfig, State};
//!
//! let fsm = Fsm::new(FsmConfig::default().with_state_ttl(Duration::from_secs(600)))?;
//!
//! fsm.create(user_id);
//! fsm.transition(user_id, "awaiting_photo");
//! fsm.set(user_id, "caption", "sunset");
//! fsm.finish(user_id); // cache cleared
//! ```

mod config;
mod error;
mod fsm;
mod media;
mod reaper;
mod scope;
mod state;
mod store;
mod table;
mod ttl;

pub use config::{DEFAULT_STATE_SWEEP_INTERVAL, DEFAULT_STATE_TTL, FsmConfig};
pub use error::{Error, Result};
pub use fsm::Fsm;
pub use media::{File, MediaGroup};
pub use reaper::ReaperHandle;
pub use scope::UserScope;
pub use state::State;
pub use store::{
    CacheStore, CacheValue, DEFAULT_NAMESPACE, FlatBackend, FlatStore, MemoryStore, UserId,
};
pub use table::{StateRecord, StateTable};
pub use ttl::LastSeen;
