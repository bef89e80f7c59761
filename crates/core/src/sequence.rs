//! Shared rope machinery for strings and arrays
//!
//! Both [`FemString`](crate::FemString) and [`FemArray`](crate::FemArray) are
//! immutable trees of view nodes (`Concat`, `Section`, `Reverse`) over
//! contiguous leaves. Building a view never copies backing storage;
//! `compact()` is the only operation that materializes one.
//!
//! Traversal goes through [`Sequence::export`], a push-style walk that lets
//! the consumer stop early. Hashing, search, equality and conversion are all
//! written on top of it.

use crate::error::{FemError, FemResult};

/// Receiver for elements produced by [`Sequence::export`].
///
/// Returning `false` stops the traversal.
pub trait Collector<T> {
    fn push(&mut self, item: T) -> bool;
}

impl<T, F> Collector<T> for F
where
    F: FnMut(T) -> bool,
{
    fn push(&mut self, item: T) -> bool {
        self(item)
    }
}

/// FNV-1a offset basis used as the initial hash accumulator.
pub const HASH_INIT: u32 = 0x811C_9DC5;

const HASH_PRIME: u32 = 0x0100_0193;

/// Mixes `next` into the accumulator.
#[inline]
pub fn hash_push(hash: u32, next: u32) -> u32 {
    hash.wrapping_mul(HASH_PRIME) ^ next
}

/// Maps a computed hash into the cacheable domain (`0` means "not computed").
#[inline]
pub(crate) fn hash_finish(hash: u32) -> u32 {
    if hash == 0 { 1 } else { hash }
}

/// View depth past which a new view is flattened into a leaf.
///
/// Keeps traversal recursion bounded for ropes grown by repeated appends.
pub(crate) const MAX_DEPTH: u16 = 256;

pub(crate) fn check_index(index: usize, length: usize) -> FemResult<()> {
    if index < length {
        Ok(())
    } else {
        Err(FemError::index(index, length))
    }
}

pub(crate) fn check_range(offset: usize, length: usize, total: usize) -> FemResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(FemError::range(offset, length, total)),
    }
}

/// Knuth-Morris-Pratt failure table: for each prefix of `needle`, the length
/// of its longest proper prefix that is also a suffix.
pub(crate) fn partial_matches<T: PartialEq>(needle: &[T]) -> Vec<usize> {
    let mut table = vec![0; needle.len()];
    let mut matched = 0;
    for index in 1..needle.len() {
        while matched > 0 && needle[index] != needle[matched] {
            matched = table[matched - 1];
        }
        if needle[index] == needle[matched] {
            matched += 1;
        }
        table[index] = matched;
    }
    table
}

/// Immutable, structurally shared, indexable sequence.
pub trait Sequence: Sized + Clone {
    type Item;

    fn length(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Returns the element at `index`, or a bounds error.
    fn get(&self, index: usize) -> FemResult<Self::Item>;

    /// Returns a view of `length` elements starting at `offset`.
    fn section(&self, offset: usize, length: usize) -> FemResult<Self>;

    /// Returns the concatenation of `self` and `other` without copying.
    fn concat(&self, other: &Self) -> Self;

    /// Returns the elements in reverse order.
    fn reverse(&self) -> Self;

    /// Flattens view chains into a single contiguous leaf.
    fn compact(&self) -> Self;

    /// Visits `length` elements starting at `offset`, front to back when
    /// `forward`, back to front otherwise.
    ///
    /// Returns `Ok(false)` if the collector stopped the traversal.
    fn export<C: Collector<Self::Item>>(
        &self,
        collector: &mut C,
        offset: usize,
        length: usize,
        forward: bool,
    ) -> FemResult<bool>;

    fn to_vec(&self) -> Vec<Self::Item> {
        let mut items = Vec::with_capacity(self.length());
        // The full range is always valid.
        let _ = self.export(
            &mut |item: Self::Item| {
                items.push(item);
                true
            },
            0,
            self.length(),
            true,
        );
        items
    }
}
