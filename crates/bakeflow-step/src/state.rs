//! Typed state bag shared between the steps of one build

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Set when a step halted the pipeline. Holds the error the step reported.
pub const ERROR: StateKey<anyhow::Error> = StateKey::new("error");

/// Set by the runner when a step returned [`crate::StepAction::Halt`].
pub const HALTED: StateKey<bool> = StateKey::new("halted");

/// Set by the runner when the build was interrupted.
pub const CANCELLED: StateKey<bool> = StateKey::new("cancelled");

/// Name of a state bag entry together with the type stored under it.
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.name)
    }
}

/// Values produced by earlier steps and consumed by later steps and cleanup.
///
/// The bag is owned by the pipeline task; only one step touches it at a time.
#[derive(Default)]
pub struct StateBag {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous value under the same key.
    pub fn put<T: Send + Sync + 'static>(&mut self, key: StateKey<T>, value: T) {
        self.values.insert(key.name, Box::new(value));
    }

    /// Read a value that an earlier step must have written.
    ///
    /// # Panics
    ///
    /// Panics when the key is absent or holds a different type. Both mean the
    /// step list is wired incorrectly; [`crate::Runner::validate`] catches
    /// the first case before anything runs.
    pub fn get<T: 'static>(&self, key: StateKey<T>) -> &T {
        match self.values.get(key.name) {
            Some(value) => match value.downcast_ref::<T>() {
                Some(v) => v,
                None => panic!(
                    "state key '{}' holds a value of an unexpected type",
                    key.name
                ),
            },
            None => panic!("state key '{}' was read before any step wrote it", key.name),
        }
    }

    /// Read a value if present. Cleanup code uses this so it can no-op when
    /// the forward action never produced its outputs.
    pub fn get_opt<T: 'static>(&self, key: StateKey<T>) -> Option<&T> {
        self.values
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Convenience for boolean flags: absent reads as `false`.
    pub fn flag(&self, key: StateKey<bool>) -> bool {
        self.get_opt(key).copied().unwrap_or(false)
    }

    pub fn contains<T>(&self, key: StateKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    pub fn remove<T: 'static>(&mut self, key: StateKey<T>) -> Option<T> {
        let value = self.values.remove(key.name)?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Names of every key currently present.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("StateBag").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: StateKey<String> = StateKey::new("name");
    const COUNT: StateKey<u32> = StateKey::new("count");

    #[test]
    fn test_put_get() {
        let mut state = StateBag::new();
        state.put(NAME, "bfvm1234".to_string());
        state.put(COUNT, 3);

        assert_eq!(state.get(NAME), "bfvm1234");
        assert_eq!(*state.get(COUNT), 3);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_get_opt_missing() {
        let state = StateBag::new();
        assert!(state.get_opt(NAME).is_none());
        assert!(!state.flag(HALTED));
    }

    #[test]
    #[should_panic(expected = "was read before any step wrote it")]
    fn test_get_missing_panics() {
        let state = StateBag::new();
        state.get(NAME);
    }

    #[test]
    fn test_remove_returns_owned_value() {
        let mut state = StateBag::new();
        state.put(NAME, "bfrg".to_string());

        assert_eq!(state.remove(NAME).as_deref(), Some("bfrg"));
        assert!(!state.contains(NAME));
    }
}
