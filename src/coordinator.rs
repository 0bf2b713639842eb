//! Fan-out across shards and the container-wide operations built from them:
//! mode locking, automatic resize-and-retry, and the observable counters.

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::hash::hash_key;
use crate::table::{CacheOutcome, SetOutcome, Shard};

const RESIZE_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Dict,
    Cache,
}

/// A sharded cuckoo hash table operating in either dict mode (`get`/`set`/
/// `unset`, growing on demand) or bounded cache mode (`cache`, fixed
/// capacity with CLOCK eviction). The mode locks in on first use of either
/// family of methods; mixing the two returns [`Error::ModeConflict`].
pub struct CuckooTable {
    config: Config,
    shards: Vec<Shard>,
    shard_mask: u32,
    mode: Option<Mode>,
    len: u64,
}

impl CuckooTable {
    pub fn new(
        key_size: usize,
        value_size: usize,
        elements_min: Option<u64>,
        elements_max: Option<u64>,
    ) -> Result<Self, Error> {
        let config = Config::new(key_size, value_size, elements_min, elements_max)?;
        let shards = (0..config.shard_count)
            .map(|_| Shard::new(config.key_size, config.value_size, config.initial_bucket_count))
            .collect();
        let shard_mask = (config.shard_count - 1) as u32;
        Ok(CuckooTable {
            config,
            shards,
            shard_mask,
            mode: None,
            len: 0,
        })
    }

    pub fn key_size(&self) -> usize {
        self.config.key_size
    }

    pub fn value_size(&self) -> usize {
        self.config.value_size
    }

    /// Number of elements currently stored.
    pub fn length(&self) -> u64 {
        self.len
    }

    /// Total bucket slots across every shard at the current sizing.
    pub fn capacity(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.bucket_count() as u64 * crate::config::SLOTS_PER_BUCKET as u64)
            .sum()
    }

    /// Total bytes allocated across every shard at the current sizing.
    pub fn size(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.bucket_count() as u64 * self.config.bucket_stride as u64)
            .sum()
    }

    /// Fraction of `capacity()` currently occupied.
    pub fn load(&self) -> f64 {
        let total = self.capacity();
        if total == 0 {
            0.0
        } else {
            self.len as f64 / total as f64
        }
    }

    fn validate_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.config.key_size {
            return Err(Error::KeyLengthMismatch);
        }
        Ok(())
    }

    fn validate_value(&self, value: &[u8]) -> Result<(), Error> {
        if value.len() != self.config.value_size {
            return Err(Error::ValueLengthMismatch);
        }
        Ok(())
    }

    fn lock_mode(&mut self, wanted: Mode) -> Result<(), Error> {
        match self.mode {
            None => {
                self.mode = Some(wanted);
                Ok(())
            }
            Some(m) if m == wanted => Ok(()),
            Some(_) => Err(Error::ModeConflict),
        }
    }

    /// Shard selection uses the top byte of both H1 and H2, orthogonal to
    /// the low bits each shard uses for its own bucket selection.
    fn shard_for(&self, key: &[u8]) -> usize {
        let (h1, h2) = hash_key(key);
        let combined = ((h1 >> 24) << 8) | (h2 >> 24);
        (combined & self.shard_mask) as usize
    }

    pub fn exist(&self, key: &[u8]) -> Result<bool, Error> {
        self.validate_key(key)?;
        let idx = self.shard_for(key);
        Ok(self.shards[idx].exist(key, &hash_key))
    }

    pub fn get(&mut self, key: &[u8], out_value: &mut [u8]) -> Result<bool, Error> {
        self.validate_key(key)?;
        self.validate_value(out_value)?;
        let idx = self.shard_for(key);
        Ok(self.shards[idx].get(key, out_value, &hash_key))
    }

    /// Inserts or updates `key`. Returns [`SetOutcome::Inserted`] or
    /// [`SetOutcome::Updated`] (never `Overflow`: that case is absorbed by
    /// the resize-and-retry loop below and surfaces only as
    /// [`Error::SetExhausted`]).
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<SetOutcome, Error> {
        self.validate_key(key)?;
        self.validate_value(value)?;
        self.lock_mode(Mode::Dict)?;

        let idx = self.shard_for(key);
        for attempt in 0..=RESIZE_ATTEMPTS {
            match self.shards[idx].set(key, value, &hash_key) {
                SetOutcome::Inserted => {
                    self.len += 1;
                    return Ok(SetOutcome::Inserted);
                }
                SetOutcome::Updated => return Ok(SetOutcome::Updated),
                SetOutcome::Overflow => {
                    if attempt == RESIZE_ATTEMPTS {
                        warn!(shard = idx, attempt, "set exhausted available resize attempts");
                        return Err(Error::SetExhausted);
                    }
                    let new_count = self.shards[idx].bucket_count() * 2;
                    debug!(shard = idx, new_count, "growing shard after overflow");
                    if !self.shards[idx].resize(new_count, &hash_key) {
                        warn!(shard = idx, new_count, "resize could not relocate all elements");
                        return Err(Error::SetExhausted);
                    }
                }
            }
        }
        Err(Error::SetExhausted)
    }

    pub fn unset(&mut self, key: &[u8]) -> Result<bool, Error> {
        self.validate_key(key)?;
        let idx = self.shard_for(key);
        let removed = self.shards[idx].unset(key, &hash_key);
        if removed {
            self.len -= 1;
        }
        Ok(removed)
    }

    pub fn cache(&mut self, key: &[u8], value: &[u8]) -> Result<CacheOutcome, Error> {
        self.validate_key(key)?;
        self.validate_value(value)?;
        self.lock_mode(Mode::Cache)?;

        let idx = self.shard_for(key);
        let outcome = self.shards[idx].cache(key, value, &hash_key);
        match outcome {
            CacheOutcome::InsertedNoEviction => self.len += 1,
            CacheOutcome::InsertedWithEviction => {}
            CacheOutcome::Updated => {}
        }
        Ok(outcome)
    }
}
