//! Parsing options for a [`Hive`](crate::Hive).

/// Default bound on parent-chain walks.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Tunables applied for the lifetime of one opened hive.
#[derive(Debug, Clone)]
pub struct HiveOptions {
    /// Keep parsed key nodes in an offset-keyed cache.
    ///
    /// The backing buffer is immutable, so the cache never changes what a
    /// lookup returns, only how often a key cell is re-decoded.
    pub cache_keys: bool,

    /// Maximum number of parent links followed by [`RegistryKey::path`](crate::RegistryKey::path).
    /// A chain that revisits an offset or runs past this bound is reported
    /// as a format error.
    pub max_depth: usize,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            cache_keys: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl HiveOptions {
    /// Options with the key cache turned off; every access re-parses.
    pub fn uncached() -> Self {
        Self {
            cache_keys: false,
            ..Self::default()
        }
    }

    /// Overrides the parent-chain bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
