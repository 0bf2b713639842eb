//! Tabulation hash producing the pair of 32-bit words (H1, H2) every other
//! component keys off of. Seeded once per process from OS entropy.

use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::KEY_SIZE_MAX;

struct TabulationTables {
    h1: Box<[[u32; 256]; KEY_SIZE_MAX]>,
    h2: Box<[[u32; 256]; KEY_SIZE_MAX]>,
}

impl TabulationTables {
    fn generate() -> Self {
        let mut rng = OsRng;
        let mut h1 = Box::new([[0u32; 256]; KEY_SIZE_MAX]);
        let mut h2 = Box::new([[0u32; 256]; KEY_SIZE_MAX]);
        for pos in 0..KEY_SIZE_MAX {
            for byte in 0..256 {
                h1[pos][byte] = rng.next_u32();
                h2[pos][byte] = rng.next_u32();
            }
        }
        Self { h1, h2 }
    }
}

static TABLES: OnceLock<TabulationTables> = OnceLock::new();

/// Compute `(H1, H2)` for a key using the process-wide tabulation tables,
/// initializing them from OS entropy on first use. Two containers
/// constructed in the same process share the same tables, per design.
pub fn hash_key(key: &[u8]) -> (u32, u32) {
    let tables = TABLES.get_or_init(TabulationTables::generate);
    let mut h1 = 0u32;
    let mut h2 = 0u32;
    for (pos, &byte) in key.iter().enumerate() {
        h1 ^= tables.h1[pos][byte as usize];
        h2 ^= tables.h2[pos][byte as usize];
    }
    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_within_process() {
        let key = [1u8, 2, 3, 4];
        let (a1, a2) = hash_key(&key);
        let (b1, b2) = hash_key(&key);
        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
    }

    #[test]
    fn distinct_keys_usually_differ() {
        let (a1, a2) = hash_key(&[0u8, 0, 0, 0]);
        let (b1, b2) = hash_key(&[0u8, 0, 0, 1]);
        assert!(a1 != b1 || a2 != b2);
    }

    #[test]
    fn h1_and_h2_are_usually_independent() {
        let (h1, h2) = hash_key(&[9u8, 8, 7, 6]);
        assert_ne!(h1, h2);
    }
}
