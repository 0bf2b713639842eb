//! Bucket layout and the single-shard operations built on top of it.

pub mod copy_dispatch;
pub mod layout;
pub mod shard;
pub mod slot_index;

pub use shard::{CacheOutcome, HashFn, SetOutcome, Shard};
