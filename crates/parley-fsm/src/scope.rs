//! User-bound view of an [`Fsm`].
//!
//! Request handlers usually resolve the user once (from the inbound event) and
//! then make several calls on that user's behalf. [`UserScope`] carries the id
//! so handlers cannot mix users up halfway through.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::fsm::Fsm;
use crate::media::{File, MediaGroup};
use crate::state::State;
use crate::store::{CacheValue, UserId};

/// An [`Fsm`] bound to one user.
#[derive(Debug, Clone, Copy)]
pub struct UserScope<'a> {
    fsm: &'a Fsm,
    user: UserId,
}

impl<'a> UserScope<'a> {
    pub(crate) fn new(fsm: &'a Fsm, user: UserId) -> Self {
        Self { fsm, user }
    }

    /// The bound user id.
    pub fn id(&self) -> UserId {
        self.user
    }

    /// See [`Fsm::create`].
    pub fn create(&self) {
        self.fsm.create(self.user);
    }

    /// See [`Fsm::transition`].
    pub fn transition(&self, state: impl Into<State>) {
        self.fsm.transition(self.user, state);
    }

    /// See [`Fsm::finish`].
    pub fn finish(&self) {
        self.fsm.finish(self.user);
    }

    /// See [`Fsm::current_state`].
    pub fn current_state(&self) -> Option<State> {
        self.fsm.current_state(self.user)
    }

    /// See [`Fsm::is_in`].
    pub fn is_in(&self, allowed: &[State]) -> bool {
        self.fsm.is_in(self.user, allowed)
    }

    /// See [`Fsm::set`].
    pub fn set(&self, key: &str, value: impl Into<CacheValue>) {
        self.fsm.set(self.user, key, value);
    }

    /// See [`Fsm::get`].
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        self.fsm.get(self.user, key)
    }

    /// See [`Fsm::set_as`].
    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.fsm.set_as(self.user, key, value)
    }

    /// See [`Fsm::get_as`].
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.fsm.get_as(self.user, key)
    }

    /// See [`Fsm::set_media`].
    pub fn set_media(&self, group_id: &str, file: File) {
        self.fsm.set_media(self.user, group_id, file);
    }

    /// See [`Fsm::get_media`].
    pub fn get_media(&self, group_id: &str) -> Option<Arc<MediaGroup>> {
        self.fsm.get_media(self.user, group_id)
    }

    /// See [`Fsm::clean_media_cache`].
    pub fn clean_media_cache(&self, group_id: &str) -> bool {
        self.fsm.clean_media_cache(self.user, group_id)
    }

    /// See [`Fsm::clean_cache`].
    pub fn clean_cache(&self) {
        self.fsm.clean_cache(self.user);
    }
}
