//! Builder-style configuration for the cache and its two in-process B+trees.

use crate::codec::CodecKind;

/// Default tiny/medium classification boundaries, in bytes.
pub const TINY_MAX_DEFAULT: usize = 128;
/// See [`TINY_MAX_DEFAULT`].
pub const MEDIUM_MAX_DEFAULT: usize = 2048;

/// Fraction of DRAM capacity at which the eviction thread starts working.
pub const EVICTION_THRESHOLD: f64 = 0.9;

/// Fraction of DRAM capacity the eviction thread evicts towards once triggered.
pub const EVICTION_TARGET_FRACTION: f64 = 0.10;

/// Upper bound on an external key's length.
pub const MAX_KEY_SIZE: usize = 256;

/// Configuration for [`crate::router::ZipCache`].
#[derive(Clone, Debug)]
pub struct Config {
    /// DRAM tier capacity, in bytes.
    pub dram_capacity: usize,
    /// Objects at or below this size are classified `Tiny`.
    pub tiny_max: usize,
    /// Objects at or below this size (and above `tiny_max`) are classified `Medium`.
    pub medium_max: usize,
    /// DRAM B+tree configuration.
    pub dram_tree: DramTreeConfig,
    /// SSD B+tree configuration.
    pub ssd_tree: SsdTreeConfig,
}

impl Config {
    /// Creates a config with the default thresholds for the given DRAM capacity.
    #[must_use]
    pub fn new(dram_capacity_mb: usize) -> Self {
        Self {
            dram_capacity: dram_capacity_mb * 1024 * 1024,
            tiny_max: TINY_MAX_DEFAULT,
            medium_max: MEDIUM_MAX_DEFAULT,
            dram_tree: DramTreeConfig::default(),
            ssd_tree: SsdTreeConfig::default(),
        }
    }

    /// Overrides the tiny/medium thresholds.
    ///
    /// # Panics
    ///
    /// Panics if `0 < tiny_max < medium_max` does not hold.
    #[must_use]
    pub fn thresholds(mut self, tiny_max: usize, medium_max: usize) -> Self {
        assert!(tiny_max > 0 && tiny_max < medium_max, "invalid thresholds");
        self.tiny_max = tiny_max;
        self.medium_max = medium_max;
        self
    }
}

/// Configuration for the compressed DRAM B+tree (component J).
#[derive(Clone, Debug)]
pub struct DramTreeConfig {
    /// Max children per internal node.
    pub order: usize,
    /// Max entries per leaf.
    pub leaf_entries: usize,
    /// Number of hashed sub-pages per compressed leaf.
    pub sub_pages: usize,
    /// Compression codec.
    pub algo: CodecKind,
    /// Number of buffered records that triggers a background flush.
    pub flush_threshold: usize,
    /// Whether the lazy write-buffer path is used at all.
    pub lazy_compression: bool,
}

impl Default for DramTreeConfig {
    fn default() -> Self {
        Self {
            order: 16,
            leaf_entries: 32,
            sub_pages: 16,
            algo: CodecKind::Fast,
            flush_threshold: crate::dram::write_buffer::MAX_BUFFER_ENTRIES - 4,
            lazy_compression: true,
        }
    }
}

/// Configuration for the SSD B+tree (component F).
#[derive(Clone, Debug)]
pub struct SsdTreeConfig {
    /// Max children per internal node.
    pub order: usize,
    /// Max entries per sub-page (derived from `SUB_PAGE_SIZE`, kept here for
    /// documentation/testing convenience).
    pub entries_per_sub_page: usize,
    /// Sub-pages per super-leaf.
    pub sub_pages_per_super_leaf: usize,
}

impl Default for SsdTreeConfig {
    fn default() -> Self {
        Self {
            order: 16,
            entries_per_sub_page: crate::ssd::sub_page::ENTRIES_PER_SUB_PAGE,
            sub_pages_per_super_leaf: crate::ssd::super_leaf::SUB_PAGES_PER_SUPER_LEAF,
        }
    }
}
