//! Per-request key/value state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

/// Values that middleware hand to everything downstream of them.
///
/// Lives for exactly one request. Each middleware writes only the keys it
/// declares in its [`Contract`](crate::Contract); any code may read any key.
/// Values are reference counted, so cloning the container is cheap.
#[derive(Clone, Default)]
pub struct State {
    values: HashMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Builder form of [`set`](State::set), handy for `next.run_with(..)`.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Copies every entry of `other` over this container.
    pub fn merge(&mut self, other: State) {
        self.values.extend(other.values);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
