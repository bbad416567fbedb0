//! Symbolic FSM states.

use std::borrow::Cow;
use std::fmt;

/// A user's state in the FSM.
///
/// States are plain symbolic names. Three names are reserved:
/// [`State::DEFAULT`], [`State::ANY`] and [`State::NIL`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(Cow<'static, str>);

impl State {
    /// Baseline state assigned to new users. Transitioning into it clears the
    /// user's cache.
    pub const DEFAULT: State = State(Cow::Borrowed("default"));

    /// Wildcard that matches any current state in [`State::matches`].
    pub const ANY: State = State(Cow::Borrowed("any"));

    /// Placeholder reported when a user has no state at all.
    pub const NIL: State = State(Cow::Borrowed("nil"));

    /// Create a state from a static name without allocating.
    pub const fn from_static(name: &'static str) -> Self {
        State(Cow::Borrowed(name))
    }

    /// Create a state from any name.
    pub fn new(name: impl Into<String>) -> Self {
        State(Cow::Owned(name.into()))
    }

    /// The state's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is [`State::DEFAULT`].
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// Whether this state passes a filter of allowed states.
    ///
    /// An empty filter, or one containing [`State::ANY`], accepts everything.
    pub fn matches(&self, allowed: &[State]) -> bool {
        allowed.is_empty() || allowed.iter().any(|s| *s == Self::ANY || s == self)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for State {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for State {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl AsRef<str> for State {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
