//! One shard: a contiguous byte buffer of `bucket_count` buckets and the
//! four operations (`get`/`exist`/`set`/`unset`) plus `cache` and `resize`
//! that work against it. Every hot path touches exactly one bucket in the
//! common case; cuckoo displacement (`vacate`) and resize touch more.

use crate::config;
use crate::table::layout::{filter_bit, filter_index, BucketRef, BucketRefMut, SLOTS_PER_BUCKET};
use crate::table::{copy_dispatch, slot_index};

pub type HashFn<'a> = dyn Fn(&[u8]) -> (u32, u32) + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Inserted,
    Updated,
    /// Cuckoo displacement could not place the element; the coordinator
    /// treats this as a growth signal.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    InsertedNoEviction,
    Updated,
    InsertedWithEviction,
}

#[inline]
fn tag_of(h1: u32) -> u8 {
    ((h1 >> 16) & 0xFF) as u8
}

#[inline]
fn bucket_index(h: u32, mask: u32) -> usize {
    (h & mask) as usize
}

pub struct Shard {
    buffer: Vec<u8>,
    key_size: usize,
    value_size: usize,
    bucket_stride: usize,
    bucket_count: usize,
    mask: u32,
}

impl Shard {
    pub fn new(key_size: usize, value_size: usize, bucket_count: usize) -> Self {
        debug_assert!(bucket_count.is_power_of_two() && bucket_count >= 2);
        let bucket_stride = config::bucket_stride(key_size, value_size);
        Shard {
            buffer: vec![0u8; bucket_stride * bucket_count],
            key_size,
            value_size,
            bucket_stride,
            bucket_count,
            mask: (bucket_count - 1) as u32,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[inline]
    fn bucket(&self, b: usize) -> BucketRef<'_> {
        let off = b * self.bucket_stride;
        BucketRef::new(&self.buffer[off..off + self.bucket_stride])
    }

    #[inline]
    fn bucket_mut(&mut self, b: usize) -> BucketRefMut<'_> {
        let off = b * self.bucket_stride;
        BucketRefMut::new(&mut self.buffer[off..off + self.bucket_stride])
    }

    fn find_key_in_bucket(&self, b: usize, tag: u8, key: &[u8]) -> Option<usize> {
        let view = self.bucket(b);
        for s in 0..SLOTS_PER_BUCKET {
            if view.is_occupied(s) && view.tag(s) == tag && view.key(s, self.key_size, self.value_size) == key {
                return Some(s);
            }
        }
        None
    }

    fn first_empty_slot(&self, b: usize) -> Option<usize> {
        let idx = slot_index::first_empty(self.bucket(b).presence());
        if idx < SLOTS_PER_BUCKET {
            Some(idx)
        } else {
            None
        }
    }

    fn write_slot(&mut self, b: usize, slot: usize, key: &[u8], value: &[u8], tag: u8) {
        let (key_size, value_size) = (self.key_size, self.value_size);
        let mut view = self.bucket_mut(b);
        view.set_presence_bit(slot);
        view.set_tag(slot, tag);
        view.clear_clock_used_bit(slot);
        copy_dispatch::copy(view.key_mut(slot, key_size, value_size), key);
        copy_dispatch::copy(view.value_mut(slot, key_size, value_size), value);
    }

    fn write_value_in_place(&mut self, b: usize, slot: usize, value: &[u8]) {
        let (key_size, value_size) = (self.key_size, self.value_size);
        let mut view = self.bucket_mut(b);
        copy_dispatch::copy(view.value_mut(slot, key_size, value_size), value);
    }

    fn clear_slot(&mut self, b: usize, slot: usize) {
        let (key_size, value_size) = (self.key_size, self.value_size);
        let mut view = self.bucket_mut(b);
        view.clear_presence_bit(slot);
        view.set_tag(slot, 0);
        view.clear_clock_used_bit(slot);
        view.key_mut(slot, key_size, value_size).fill(0);
        view.value_mut(slot, key_size, value_size).fill(0);
    }

    /// Clear `F[fi]` and rebuild it from the bucket's own occupied slots,
    /// unless elements physically live here as someone else's second
    /// position (counter != 0), in which case a local-only rebuild would
    /// silently drop filter bits for elements displaced elsewhere.
    fn filter_reset(&mut self, b: usize, fi: usize) {
        if self.bucket(b).counter() != 0 {
            return;
        }
        if self.bucket(b).filter(fi) == 0 {
            return;
        }
        self.bucket_mut(b).clear_filter(fi);
        for s in 0..SLOTS_PER_BUCKET {
            let view = self.bucket(b);
            if view.is_occupied(s) {
                let tag = view.tag(s);
                if filter_index(tag) == fi {
                    let fb = filter_bit(tag);
                    self.bucket_mut(b).set_filter_bit(fi, fb);
                }
            }
        }
    }

    /// CLOCK sweep within one bucket. Up to 9 ticks: the ninth guarantees
    /// forward progress after one full pass clears every used-bit.
    fn evict(&mut self, b: usize) -> usize {
        for _ in 0..9 {
            let hand = self.bucket(b).clock_hand() as usize;
            let advanced = ((hand + 1) & 7) as u8;
            self.bucket_mut(b).set_clock_hand(advanced);
            if !self.bucket(b).clock_used_bit(hand) {
                return hand;
            }
            self.bucket_mut(b).clear_clock_used_bit(hand);
        }
        unreachable!("CLOCK sweep must find a victim within 9 ticks")
    }

    /// Try to free one slot in `target` by relocating one of its residents
    /// to that resident's alternate bucket. Returns whether a slot was freed.
    fn vacate(&mut self, target: usize, hash_fn: &HashFn<'_>) -> bool {
        for s in 0..SLOTS_PER_BUCKET {
            if !self.bucket(target).is_occupied(s) {
                continue;
            }
            let resident_key = self
                .bucket(target)
                .key(s, self.key_size, self.value_size)
                .to_vec();
            let (rh1, rh2) = hash_fn(&resident_key);
            let first_idx = bucket_index(rh1, self.mask);
            let second_idx = bucket_index(rh2, self.mask);
            let resident_in_first = first_idx == target;
            let alt = if resident_in_first { second_idx } else { first_idx };
            if alt == target {
                continue;
            }
            if let Some(empty) = self.first_empty_slot(alt) {
                let resident_value = self
                    .bucket(target)
                    .value(s, self.key_size, self.value_size)
                    .to_vec();
                let tag = self.bucket(target).tag(s);
                self.write_slot(alt, empty, &resident_key, &resident_value, tag);
                if resident_in_first {
                    // Now physically stored as its second position in `alt`.
                    self.bucket_mut(alt).increment_counter();
                } else {
                    // Returns to being physically stored at its first position.
                    self.bucket_mut(target).decrement_counter();
                }
                self.clear_slot(target, s);
                return true;
            }
        }
        false
    }

    pub fn exist(&self, key: &[u8], hash_fn: &HashFn<'_>) -> bool {
        let (h1, h2) = hash_fn(key);
        let tag = tag_of(h1);
        let fi = filter_index(tag);
        let fb = filter_bit(tag);
        let b1 = bucket_index(h1, self.mask);
        if self.bucket(b1).filter(fi) & fb == 0 {
            return false;
        }
        if self.find_key_in_bucket(b1, tag, key).is_some() {
            return true;
        }
        let b2 = bucket_index(h2, self.mask);
        self.find_key_in_bucket(b2, tag, key).is_some()
    }

    pub fn get(&mut self, key: &[u8], out_value: &mut [u8], hash_fn: &HashFn<'_>) -> bool {
        let (h1, h2) = hash_fn(key);
        let tag = tag_of(h1);
        let fi = filter_index(tag);
        let fb = filter_bit(tag);
        let b1 = bucket_index(h1, self.mask);
        if self.bucket(b1).filter(fi) & fb == 0 {
            return false;
        }
        if let Some(s) = self.find_key_in_bucket(b1, tag, key) {
            out_value.copy_from_slice(self.bucket(b1).value(s, self.key_size, self.value_size));
            self.bucket_mut(b1).set_clock_used(s);
            return true;
        }
        let b2 = bucket_index(h2, self.mask);
        if let Some(s) = self.find_key_in_bucket(b2, tag, key) {
            out_value.copy_from_slice(self.bucket(b2).value(s, self.key_size, self.value_size));
            self.bucket_mut(b2).set_clock_used(s);
            return true;
        }
        false
    }

    pub fn set(&mut self, key: &[u8], value: &[u8], hash_fn: &HashFn<'_>) -> SetOutcome {
        let (h1, h2) = hash_fn(key);
        let tag = tag_of(h1);
        let fi = filter_index(tag);
        let fb = filter_bit(tag);
        let b1 = bucket_index(h1, self.mask);
        let b2 = bucket_index(h2, self.mask);

        if self.bucket(b1).filter(fi) & fb != 0 {
            if let Some(s) = self.find_key_in_bucket(b1, tag, key) {
                self.write_value_in_place(b1, s, value);
                return SetOutcome::Updated;
            }
            if let Some(s) = self.find_key_in_bucket(b2, tag, key) {
                self.write_value_in_place(b2, s, value);
                return SetOutcome::Updated;
            }
        }

        if let Some(s) = self.first_empty_slot(b1) {
            self.write_slot(b1, s, key, value, tag);
            self.bucket_mut(b1).set_filter_bit(fi, fb);
            return SetOutcome::Inserted;
        }

        if let Some(s) = self.first_empty_slot(b2) {
            self.write_slot(b2, s, key, value, tag);
            self.bucket_mut(b1).set_filter_bit(fi, fb);
            self.bucket_mut(b2).increment_counter();
            return SetOutcome::Inserted;
        }

        if self.vacate(b1, hash_fn) {
            let s = self.first_empty_slot(b1).expect("vacate just freed a slot in b1");
            self.write_slot(b1, s, key, value, tag);
            self.bucket_mut(b1).set_filter_bit(fi, fb);
            return SetOutcome::Inserted;
        }

        if self.vacate(b2, hash_fn) {
            let s = self.first_empty_slot(b2).expect("vacate just freed a slot in b2");
            self.write_slot(b2, s, key, value, tag);
            self.bucket_mut(b1).set_filter_bit(fi, fb);
            self.bucket_mut(b2).increment_counter();
            return SetOutcome::Inserted;
        }

        SetOutcome::Overflow
    }

    pub fn unset(&mut self, key: &[u8], hash_fn: &HashFn<'_>) -> bool {
        let (h1, h2) = hash_fn(key);
        let tag = tag_of(h1);
        let fi = filter_index(tag);
        let b1 = bucket_index(h1, self.mask);
        if let Some(s) = self.find_key_in_bucket(b1, tag, key) {
            self.clear_slot(b1, s);
            self.filter_reset(b1, fi);
            return true;
        }
        let b2 = bucket_index(h2, self.mask);
        if let Some(s) = self.find_key_in_bucket(b2, tag, key) {
            self.clear_slot(b2, s);
            // Decrements b1's counter, not b2's, and does not reset b1's
            // filter — a known asymmetry preserved as-is, not fixed here.
            self.bucket_mut(b1).decrement_counter();
            return true;
        }
        false
    }

    pub fn cache(&mut self, key: &[u8], value: &[u8], hash_fn: &HashFn<'_>) -> CacheOutcome {
        let (h1, _h2) = hash_fn(key);
        let tag = tag_of(h1);
        let fi = filter_index(tag);
        let fb = filter_bit(tag);
        let b1 = bucket_index(h1, self.mask);

        if self.bucket(b1).filter(fi) & fb != 0 {
            if let Some(s) = self.find_key_in_bucket(b1, tag, key) {
                self.write_value_in_place(b1, s, value);
                self.bucket_mut(b1).set_clock_used(s);
                return CacheOutcome::Updated;
            }
        }

        let victim = self.evict(b1);
        let displaced = self.bucket(b1).is_occupied(victim);
        if displaced {
            let victim_tag = self.bucket(b1).tag(victim);
            self.clear_slot(b1, victim);
            self.filter_reset(b1, filter_index(victim_tag));
        }
        self.write_slot(b1, victim, key, value, tag);
        self.bucket_mut(b1).set_filter_bit(fi, fb);
        self.bucket_mut(b1).set_clock_used(victim);

        if displaced {
            CacheOutcome::InsertedWithEviction
        } else {
            CacheOutcome::InsertedNoEviction
        }
    }

    /// Rebuild into a fresh, larger buffer. On overflow the old shard is
    /// left untouched (the caller still holds `self`) and `false` is
    /// returned; filters and CLOCK state are discarded on success.
    pub fn resize(&mut self, new_bucket_count: usize, hash_fn: &HashFn<'_>) -> bool {
        debug_assert!(new_bucket_count.is_power_of_two());
        debug_assert!(new_bucket_count >= self.bucket_count * 2);

        let mut rebuilt = Shard::new(self.key_size, self.value_size, new_bucket_count);
        for b in 0..self.bucket_count {
            for s in 0..SLOTS_PER_BUCKET {
                if self.bucket(b).is_occupied(s) {
                    let key = self.bucket(b).key(s, self.key_size, self.value_size).to_vec();
                    let value = self.bucket(b).value(s, self.key_size, self.value_size).to_vec();
                    if matches!(rebuilt.set(&key, &value, hash_fn), SetOutcome::Overflow) {
                        return false;
                    }
                }
            }
        }
        *self = rebuilt;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key4(n: u32) -> [u8; 4] {
        n.to_le_bytes()
    }

    fn fixed_hash(h1: u32, h2: u32) -> impl Fn(&[u8]) -> (u32, u32) {
        move |_| (h1, h2)
    }

    #[test]
    fn insert_then_update_then_get() {
        let mut shard = Shard::new(4, 4, 8);
        let hash_fn = crate::hash::hash_key;
        let key = key4(1);
        assert_eq!(shard.set(&key, &[0xAA; 4], &hash_fn), SetOutcome::Inserted);
        let mut out = [0u8; 4];
        assert!(shard.get(&key, &mut out, &hash_fn));
        assert_eq!(out, [0xAA; 4]);

        assert_eq!(shard.set(&key, &[0xBB; 4], &hash_fn), SetOutcome::Updated);
        let mut out = [0u8; 4];
        assert!(shard.get(&key, &mut out, &hash_fn));
        assert_eq!(out, [0xBB; 4]);
    }

    #[test]
    fn unset_removes_key() {
        let mut shard = Shard::new(4, 4, 8);
        let hash_fn = crate::hash::hash_key;
        let key = key4(42);
        shard.set(&key, &[1, 2, 3, 4], &hash_fn);
        assert!(shard.exist(&key, &hash_fn));
        assert!(shard.unset(&key, &hash_fn));
        assert!(!shard.exist(&key, &hash_fn));
        let mut out = [0u8; 4];
        assert!(!shard.get(&key, &mut out, &hash_fn));
    }

    #[test]
    fn missing_key_is_absent() {
        let shard = Shard::new(4, 4, 8);
        let hash_fn = crate::hash::hash_key;
        assert!(!shard.exist(&key4(7), &hash_fn));
    }

    #[test]
    fn second_position_insert_sets_filter_on_first_bucket() {
        // All fill keys and the target key share b1 = 0 (low 3 bits of H1
        // are zero); the target's H2 picks bucket 3, distinct from b1.
        let mut shard = Shard::new(4, 4, 8);
        for i in 0..8u32 {
            let per_key_hash = fixed_hash(i << 16, i << 16);
            assert_eq!(shard.set(&key4(100 + i), &[0; 4], &per_key_hash), SetOutcome::Inserted);
        }

        let key = key4(1);
        let hash_fn = fixed_hash(0x0001_0000, 0x0002_0003);
        assert_eq!(shard.set(&key, &[9, 9, 9, 9], &hash_fn), SetOutcome::Inserted);
        // Filter bit lives on b1 (bucket 0) even though the element is
        // physically stored in b2 (bucket 3).
        let tag = tag_of(0x0001_0000);
        let fi = filter_index(tag);
        let fb = filter_bit(tag);
        assert_ne!(shard.bucket(0).filter(fi) & fb, 0);
        assert_eq!(shard.bucket(3).counter(), 1);
    }

    #[test]
    fn resize_preserves_all_elements() {
        let mut shard = Shard::new(4, 4, 2);
        let hash_fn = crate::hash::hash_key;
        let mut inserted = Vec::new();
        for i in 0..12u32 {
            let key = key4(i);
            loop {
                match shard.set(&key, &key, &hash_fn) {
                    SetOutcome::Inserted => {
                        inserted.push(i);
                        break;
                    }
                    SetOutcome::Updated => break,
                    SetOutcome::Overflow => {
                        let new_count = shard.bucket_count() * 2;
                        assert!(shard.resize(new_count, &hash_fn));
                    }
                }
            }
        }
        for i in inserted {
            let mut out = [0u8; 4];
            assert!(shard.get(&key4(i), &mut out, &hash_fn));
            assert_eq!(out, key4(i));
        }
    }

    #[test]
    fn cache_mode_never_exceeds_capacity_and_evicts() {
        let mut shard = Shard::new(4, 4, 2); // 16 slots total
        let hash_fn = crate::hash::hash_key;
        let mut last_outcome = CacheOutcome::InsertedNoEviction;
        for i in 0..64u32 {
            last_outcome = shard.cache(&key4(i), &key4(i), &hash_fn);
        }
        assert_eq!(last_outcome, CacheOutcome::InsertedWithEviction);
        // An early key must have been evicted by now.
        assert!(!shard.exist(&key4(0), &hash_fn));
    }

    #[test]
    fn clock_evict_makes_forward_progress_even_when_all_used() {
        let mut shard = Shard::new(4, 4, 2);
        let hash_fn = crate::hash::hash_key;
        // Fill one bucket and touch every slot via get() to set all used-bits.
        for i in 0..8u32 {
            let per_key_hash = fixed_hash(0, 0);
            shard.set(&key4(i), &key4(i), &per_key_hash);
        }
        for i in 0..8u32 {
            let per_key_hash = fixed_hash(0, 0);
            let mut out = [0u8; 4];
            shard.get(&key4(i), &mut out, &per_key_hash);
        }
        let per_key_hash = fixed_hash(0, 0);
        let outcome = shard.cache(&key4(100), &key4(100), &per_key_hash);
        assert_eq!(outcome, CacheOutcome::InsertedWithEviction);
    }
}
