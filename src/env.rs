//! Scope-level environment configuration.
//!
//! An [`Environment`] holds a base key/value map plus two reserved overlay
//! maps, `development` and `production`. Resolution depends on the owning
//! scope's debug flag: the `development` overlay wins when debug is on, the
//! `production` overlay otherwise, and the base map supplies keys neither
//! overlay defines.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RegistrationError;

/// Which overlay a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Development,
    Production,
}

/// Scope-level key/value configuration with runtime overlays.
///
/// # Examples
///
/// ```
/// use seam::env::{Environment, Runtime};
///
/// let mut env = Environment::new();
/// env.set("greeting", "hello").unwrap();
/// env.set_for(Runtime::Production, "secret_key", "secret");
/// env.set_for(Runtime::Development, "secret_key", "not_secret");
///
/// assert_eq!(env.resolve("secret_key", false), Some(&"secret".into()));
/// assert_eq!(env.resolve("secret_key", true), Some(&"not_secret".into()));
/// assert_eq!(env.resolve("greeting", true), Some(&"hello".into()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    base: HashMap<String, Value>,
    development: HashMap<String, Value>,
    production: HashMap<String, Value>,
}

impl Environment {
    const RESERVED: [&'static str; 2] = ["development", "production"];

    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a base value.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::ReservedEnvKey`] when `key` is `development` or
    /// `production`; those are overlay names, set via [`set_for`](Self::set_for).
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), RegistrationError> {
        let key = key.into();
        if Self::RESERVED.contains(&key.as_str()) {
            return Err(RegistrationError::ReservedEnvKey { key });
        }
        self.base.insert(key, value.into());
        Ok(())
    }

    /// Sets a value in the given overlay.
    pub fn set_for(&mut self, runtime: Runtime, key: impl Into<String>, value: impl Into<Value>) {
        let map = match runtime {
            Runtime::Development => &mut self.development,
            Runtime::Production => &mut self.production,
        };
        map.insert(key.into(), value.into());
    }

    /// Loads an environment from a JSON object, splitting out the reserved
    /// `development` and `production` sub-objects as overlays.
    ///
    /// ```
    /// use seam::env::Environment;
    ///
    /// let env = Environment::parse(serde_json::json!({
    ///     "name": "demo",
    ///     "production": { "secret_key": "secret" },
    ///     "development": { "secret_key": "not_secret" },
    /// }));
    /// assert_eq!(env.resolve("secret_key", false), Some(&"secret".into()));
    /// ```
    pub fn parse(data: Value) -> Self {
        let mut env = Environment::new();
        let Value::Object(map) = data else {
            return env;
        };
        for (key, value) in map {
            match key.as_str() {
                "development" => env.development = overlay_of(value),
                "production" => env.production = overlay_of(value),
                _ => {
                    env.base.insert(key, value);
                }
            }
        }
        env
    }

    /// Resolves `key` under the given debug flag.
    pub fn resolve(&self, key: &str, debug: bool) -> Option<&Value> {
        let overlay = if debug {
            &self.development
        } else {
            &self.production
        };
        overlay.get(key).or_else(|| self.base.get(key))
    }

    /// Resolves `key` as a string slice, when it holds a JSON string.
    pub fn resolve_str(&self, key: &str, debug: bool) -> Option<&str> {
        self.resolve(key, debug).and_then(Value::as_str)
    }

    /// Copies every entry of `other` into `self`; `other`'s values win.
    pub fn adopt(&mut self, other: &Environment) {
        for (k, v) in &other.base {
            self.base.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.development {
            self.development.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.production {
            self.production.insert(k.clone(), v.clone());
        }
    }

    /// Returns `true` when no key is set in any map.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.development.is_empty() && self.production.is_empty()
    }
}

fn overlay_of(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_value_visible_in_both_runtimes() {
        let mut env = Environment::new();
        env.set("name", "demo").unwrap();
        assert_eq!(env.resolve_str("name", true), Some("demo"));
        assert_eq!(env.resolve_str("name", false), Some("demo"));
    }

    #[test]
    fn overlay_wins_over_base() {
        let mut env = Environment::new();
        env.set("mode", "base").unwrap();
        env.set_for(Runtime::Development, "mode", "dev");
        assert_eq!(env.resolve_str("mode", true), Some("dev"));
        assert_eq!(env.resolve_str("mode", false), Some("base"));
    }

    #[test]
    fn reserved_keys_rejected() {
        let mut env = Environment::new();
        assert!(matches!(
            env.set("production", "x"),
            Err(RegistrationError::ReservedEnvKey { .. })
        ));
        assert!(matches!(
            env.set("development", "x"),
            Err(RegistrationError::ReservedEnvKey { .. })
        ));
    }

    #[test]
    fn parse_splits_overlays() {
        let env = Environment::parse(serde_json::json!({
            "plain": 1,
            "development": { "secret_key": "not_secret" },
            "production": { "secret_key": "secret" },
        }));
        assert_eq!(env.resolve("plain", false), Some(&serde_json::json!(1)));
        assert_eq!(env.resolve_str("secret_key", false), Some("secret"));
        assert_eq!(env.resolve_str("secret_key", true), Some("not_secret"));
    }

    #[test]
    fn adopt_overrides() {
        let mut parent = Environment::new();
        parent.set("a", "parent").unwrap();
        parent.set("b", "parent").unwrap();

        let mut child = Environment::new();
        child.set("a", "child").unwrap();

        parent.adopt(&child);
        assert_eq!(parent.resolve_str("a", false), Some("child"));
        assert_eq!(parent.resolve_str("b", false), Some("parent"));
    }
}
