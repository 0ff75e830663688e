//! Store and type configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default capacity of the instance cache.
pub const DEFAULT_MAX_CACHE: usize = 1024;

/// Length of generated entity ids, in hex digits.
pub const ID_LENGTH: usize = 24;

/// Generator for new entity ids.
#[derive(Clone)]
pub struct IdSource(Arc<dyn Fn() -> String + Send + Sync>);

impl IdSource {
    /// Wrap an id generator.
    pub fn new(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A generator that hands out `prefix0`, `prefix1`, ... in order.
    pub fn sequential(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let next = std::sync::atomic::AtomicUsize::new(0);
        Self::new(move || {
            let n = next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            format!("{}{}", prefix, n)
        })
    }

    /// Produce a new id.
    #[inline]
    pub fn next_id(&self) -> String {
        (self.0)()
    }
}

impl Default for IdSource {
    /// Random 24-hex-digit ids.
    fn default() -> Self {
        Self::new(|| {
            let mut id = uuid::Uuid::new_v4().simple().to_string();
            id.truncate(ID_LENGTH);
            id
        })
    }
}

impl fmt::Debug for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdSource")
    }
}

/// Options accepted by [`Store::new`](crate::Store::new).
///
/// Deserializes from camelCase keys with every field optional:
///
/// ```
/// use schema_store::StoreOptions;
///
/// let options: StoreOptions = serde_json::from_str(r#"{"maxCache": 16}"#).unwrap();
/// assert!(options.validate);
/// assert_eq!(options.max_cache, 16);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// Check values against their types before packing.
    pub validate: bool,
    /// Accepted for compatibility; stored data is always immutable.
    pub freeze: bool,
    /// Log every dispatched action.
    pub debug: bool,
    /// Skip writes whose value is identical to the stored one.
    pub skip_write_same: bool,
    /// Capacity of the instance cache.
    pub max_cache: usize,
    /// Entity id generator used by `create`.
    #[serde(skip)]
    pub id_source: IdSource,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            validate: true,
            freeze: false,
            debug: false,
            skip_write_same: false,
            max_cache: DEFAULT_MAX_CACHE,
            id_source: IdSource::default(),
        }
    }
}

impl StoreOptions {
    #[must_use]
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_skip_write_same(mut self, skip: bool) -> Self {
        self.skip_write_same = skip;
        self
    }

    #[must_use]
    pub fn with_max_cache(mut self, max_cache: usize) -> Self {
        self.max_cache = max_cache;
        self
    }

    #[must_use]
    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    /// The subset of options that affects compiled types.
    pub fn type_options(&self) -> TypeOptions {
        TypeOptions {
            validate: self.validate,
            freeze: self.freeze,
        }
    }
}

/// Options baked into a compiled schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOptions {
    /// Verify values with `validate_assign` before packing.
    pub validate: bool,
    /// Accepted for compatibility.
    pub freeze: bool,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            freeze: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::default();
        assert!(options.validate);
        assert!(!options.skip_write_same);
        assert_eq!(options.max_cache, DEFAULT_MAX_CACHE);
    }

    #[test]
    fn test_default_ids() {
        let source = IdSource::default();
        let a = source.next_id();
        let b = source.next_id();
        assert_eq!(a.len(), ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_ids() {
        let source = IdSource::sequential("t");
        assert_eq!(source.next_id(), "t0");
        assert_eq!(source.next_id(), "t1");
    }

    #[test]
    fn test_deserialize_partial() {
        let options: StoreOptions =
            serde_json::from_str(r#"{"validate": false, "skipWriteSame": true}"#).unwrap();
        assert!(!options.validate);
        assert!(options.skip_write_same);
        assert_eq!(options.max_cache, DEFAULT_MAX_CACHE);
    }
}
