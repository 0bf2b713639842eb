//! A sharded cuckoo-style hash table with two mutually exclusive operating
//! modes: an unbounded dict (`get`/`set`/`unset`, growing via cuckoo
//! displacement and shard resize) and a bounded cache (`cache`, fixed
//! capacity with per-bucket CLOCK eviction).
//!
//! Keys are fixed-size (a multiple of 4 bytes, configured once at
//! construction) and values are fixed-size byte slices. Each shard packs
//! its buckets into a cache-line-aligned byte buffer: a per-bucket bloom
//! filter over key tags short-circuits misses, and a second-position
//! counter tracks how many elements are physically displaced into a
//! bucket as their alternate position.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hash;
pub mod table;

pub use config::Config;
pub use coordinator::CuckooTable;
pub use error::Error;
pub use table::{CacheOutcome, SetOutcome};
