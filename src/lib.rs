//! `ZipCache`: a multi-tier key-value cache that routes objects by size
//! across three B+tree indexes — DRAM, SSD, and large-object storage —
//! and coordinates their consistency behind a single logical namespace.
//!
//! See [`ZipCache`] for the public entry point.

pub mod block;
pub mod checksum;
pub mod codec;
pub mod coding;
pub mod config;
pub mod dram;
pub mod error;
pub mod hash;
pub mod lo;
pub mod router;
pub mod ssd;
pub mod stop_signal;

pub use config::Config;
pub use error::{Error, Result};
pub use router::stats::Stats;
pub use router::ZipCache;
