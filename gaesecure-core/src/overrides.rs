//! Default keyword-argument overrides.
//!
//! A [`DefaultOverrides`] holds a set of keyword defaults. Wrapping a
//! function with it fills in any keyword the caller left out, while
//! anything the caller passes explicitly still wins.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Keyword arguments, by name.
pub type Kwargs = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultOverrides {
    defaults: Kwargs,
}

/// Builds the decorator that applies `overrides` to a wrapped function.
pub fn override_default_kwargs(overrides: Kwargs) -> DefaultOverrides {
    DefaultOverrides::from_map(overrides)
}

impl DefaultOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(defaults: Kwargs) -> Self {
        Self { defaults }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.defaults.get(key)
    }

    /// A fresh copy of the defaults overlaid with `explicit`, key by key.
    pub fn merge(&self, explicit: Kwargs) -> Kwargs {
        let mut merged = self.defaults.clone();
        merged.extend(explicit);
        merged
    }

    /// Same merge as [`merge`](Self::merge) on a typed options struct.
    ///
    /// Fields that serialize as absent (`skip_serializing_if`) count as not
    /// supplied by the caller.
    pub fn apply<T>(&self, explicit: &T) -> Result<T, serde_json::Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let explicit = match serde_json::to_value(explicit)? {
            Value::Object(map) => map,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "keyword overrides need an object, got {}",
                    other
                )))
            }
        };
        serde_json::from_value(Value::Object(self.merge(explicit)))
    }

    /// Wraps `function` so every call sees the merged keyword arguments.
    pub fn wrap<A, R, F>(&self, function: F) -> impl Fn(A, Kwargs) -> R
    where
        F: Fn(A, Kwargs) -> R,
    {
        let overrides = self.clone();
        move |args, kwargs| function(args, overrides.merge(kwargs))
    }
}
