//! Value arrays with structural sharing
//!
//! Same rope layout as [`FemString`](crate::FemString), with [`Value`]
//! elements. One extra leaf kind backs the lazily bound parameters of a
//! [`Frame`](crate::Frame): each slot is a [`Future`], exposed as its value
//! once forced and as the unforced future before that.
//!
//! Because elements may be lazy, equality and hashing can force evaluation
//! and are therefore fallible. Both stop at the first difference or failure
//! without copying the array first.

use crate::error::{FemError, FemResult};
use crate::future::Future;
use crate::sequence::{
    Collector, HASH_INIT, MAX_DEPTH, Sequence, check_index, check_range, hash_finish, hash_push,
};
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

/// Immutable sequence of values.
#[derive(Clone)]
pub struct FemArray(Arc<ArrayNode>);

struct ArrayNode {
    length: usize,
    /// Cached hash; 0 until computed.
    hash: AtomicU32,
    /// 0 for leaves.
    depth: u16,
    kind: ArrayKind,
}

enum ArrayKind {
    Empty,
    Uniform(Value),
    Values(Box<[Value]>),
    Deferred(Box<[Future]>),
    Concat(FemArray, FemArray),
    Section(FemArray, usize),
    Reverse(FemArray),
}

impl ArrayKind {
    fn depth(&self) -> u16 {
        match self {
            ArrayKind::Concat(left, right) => left.0.depth.max(right.0.depth) + 1,
            ArrayKind::Section(base, _) | ArrayKind::Reverse(base) => base.0.depth + 1,
            _ => 0,
        }
    }

    fn detach(&mut self, pending: &mut Vec<FemArray>) {
        match std::mem::replace(self, ArrayKind::Empty) {
            ArrayKind::Concat(left, right) => {
                pending.push(left);
                pending.push(right);
            }
            ArrayKind::Section(base, _) | ArrayKind::Reverse(base) => pending.push(base),
            leaf => *self = leaf,
        }
    }
}

impl Drop for ArrayNode {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.kind.detach(&mut pending);
        while let Some(child) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(child.0) {
                node.kind.detach(&mut pending);
            }
        }
    }
}

static EMPTY: LazyLock<FemArray> = LazyLock::new(|| FemArray::node(0, ArrayKind::Empty));

impl FemArray {
    fn node(length: usize, kind: ArrayKind) -> Self {
        FemArray(Arc::new(ArrayNode {
            length,
            hash: AtomicU32::new(0),
            depth: kind.depth(),
            kind,
        }))
    }

    fn view(length: usize, kind: ArrayKind) -> Self {
        let view = Self::node(length, kind);
        if view.0.depth > MAX_DEPTH {
            tracing::trace!(length, "flattening deep array view");
            return Self::from_values(view.to_vec());
        }
        view
    }

    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn from_values(values: impl Into<Vec<Value>>) -> Self {
        let values: Vec<Value> = values.into();
        if values.is_empty() {
            return Self::empty();
        }
        Self::node(values.len(), ArrayKind::Values(values.into_boxed_slice()))
    }

    /// `length` copies of `value`.
    pub fn uniform(value: Value, length: usize) -> Self {
        if length == 0 {
            return Self::empty();
        }
        Self::node(length, ArrayKind::Uniform(value))
    }

    /// Slots that are evaluated on first access.
    pub(crate) fn deferred(futures: Vec<Future>) -> Self {
        if futures.is_empty() {
            return Self::empty();
        }
        Self::node(futures.len(), ArrayKind::Deferred(futures.into_boxed_slice()))
    }

    pub fn concat_all(parts: &[FemArray]) -> Self {
        match parts {
            [] => Self::empty(),
            [single] => single.clone(),
            _ => {
                let mid = parts.len() / 2;
                Self::concat_all(&parts[..mid]).concat(&Self::concat_all(&parts[mid..]))
            }
        }
    }

    pub fn ptr_eq(&self, other: &FemArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Front-to-back walk over the elements, unforced.
    pub fn iter(&self) -> Values {
        Values {
            pending: vec![(self.clone(), 0, self.0.length, true)],
            leaf: None,
            remaining: self.0.length,
        }
    }

    /// Hash over the element hashes, cached on success.
    pub fn hash_code(&self) -> FemResult<u32> {
        let cached = self.0.hash.load(Ordering::Relaxed);
        if cached != 0 {
            return Ok(cached);
        }
        let mut hash = HASH_INIT;
        let mut failure = None;
        self.export_unchecked(
            &mut |value: Value| match value.hash_code() {
                Ok(next) => {
                    hash = hash_push(hash, next);
                    true
                }
                Err(err) => {
                    failure = Some(err);
                    false
                }
            },
            0,
            self.0.length,
            true,
        );
        if let Some(err) = failure {
            return Err(err);
        }
        let hash = hash_finish(hash);
        self.0.hash.store(hash, Ordering::Relaxed);
        Ok(hash)
    }

    /// Length, then hash, then element-wise equality.
    pub fn equals(&self, other: &FemArray) -> FemResult<bool> {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ok(true);
        }
        if self.0.length != other.0.length || self.hash_code()? != other.hash_code()? {
            return Ok(false);
        }
        for (mine, theirs) in self.iter().zip(other.iter()) {
            if !mine.equals(&theirs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Position of the first element equal to `value` at or after `offset`.
    /// Elements past the match are not evaluated.
    pub fn find(&self, value: &Value, offset: usize) -> FemResult<Option<usize>> {
        check_range(offset, 0, self.0.length)?;
        let mut position = offset;
        let mut outcome = Ok(None);
        self.export_unchecked(
            &mut |item: Value| match item.equals(value) {
                Ok(false) => {
                    position += 1;
                    true
                }
                Ok(true) => {
                    outcome = Ok(Some(position));
                    false
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            },
            offset,
            self.0.length - offset,
            true,
        );
        outcome
    }

    /// Forces every element; with `recursive`, nested containers too.
    pub fn result(&self, recursive: bool) -> FemResult<FemArray> {
        let items = self.to_vec();
        let mut changed = false;
        let mut forced = Vec::with_capacity(items.len());
        for item in items {
            let value = item.result(recursive)?;
            changed |= !value.same(&item);
            forced.push(value);
        }
        Ok(if changed {
            Self::from_values(forced)
        } else {
            self.clone()
        })
    }

    fn section_unchecked(&self, offset: usize, length: usize) -> FemArray {
        if length == 0 {
            return Self::empty();
        }
        if offset == 0 && length == self.0.length {
            return self.clone();
        }
        match &self.0.kind {
            ArrayKind::Uniform(value) => Self::uniform(value.clone(), length),
            ArrayKind::Section(base, base_offset) => {
                base.section_unchecked(base_offset + offset, length)
            }
            ArrayKind::Concat(left, right) => {
                let left_length = left.0.length;
                if offset >= left_length {
                    right.section_unchecked(offset - left_length, length)
                } else if offset + length <= left_length {
                    left.section_unchecked(offset, length)
                } else {
                    left.section_unchecked(offset, left_length - offset)
                        .concat(&right.section_unchecked(0, offset + length - left_length))
                }
            }
            ArrayKind::Reverse(base) => base
                .section_unchecked(self.0.length - offset - length, length)
                .reverse(),
            _ => Self::view(length, ArrayKind::Section(self.clone(), offset)),
        }
    }

    fn export_unchecked<C: Collector<Value>>(
        &self,
        collector: &mut C,
        offset: usize,
        length: usize,
        forward: bool,
    ) -> bool {
        if length == 0 {
            return true;
        }
        match &self.0.kind {
            ArrayKind::Empty => true,
            ArrayKind::Uniform(value) => (0..length).all(|_| collector.push(value.clone())),
            ArrayKind::Values(items) => {
                let items = &items[offset..offset + length];
                if forward {
                    items.iter().all(|item| collector.push(item.clone()))
                } else {
                    items.iter().rev().all(|item| collector.push(item.clone()))
                }
            }
            ArrayKind::Deferred(slots) => {
                let slots = &slots[offset..offset + length];
                if forward {
                    slots.iter().all(|slot| collector.push(slot.current()))
                } else {
                    slots.iter().rev().all(|slot| collector.push(slot.current()))
                }
            }
            ArrayKind::Concat(left, right) => {
                let left_length = left.0.length;
                if offset + length <= left_length {
                    return left.export_unchecked(collector, offset, length, forward);
                }
                if offset >= left_length {
                    return right.export_unchecked(collector, offset - left_length, length, forward);
                }
                let left_part = left_length - offset;
                let right_part = length - left_part;
                if forward {
                    left.export_unchecked(collector, offset, left_part, true)
                        && right.export_unchecked(collector, 0, right_part, true)
                } else {
                    right.export_unchecked(collector, 0, right_part, false)
                        && left.export_unchecked(collector, offset, left_part, false)
                }
            }
            ArrayKind::Section(base, base_offset) => {
                base.export_unchecked(collector, base_offset + offset, length, forward)
            }
            ArrayKind::Reverse(base) => base.export_unchecked(
                collector,
                self.0.length - offset - length,
                length,
                !forward,
            ),
        }
    }
}

/// Pull-style walk over an array produced by [`FemArray::iter`].
pub struct Values {
    pending: Vec<(FemArray, usize, usize, bool)>,
    leaf: Option<(FemArray, usize, usize, bool)>,
    remaining: usize,
}

impl Values {
    fn next_in_leaf(leaf: &mut (FemArray, usize, usize, bool)) -> Option<Value> {
        let (node, position, remaining, forward) = leaf;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        let index = if *forward {
            *position += 1;
            *position - 1
        } else {
            *position -= 1;
            *position
        };
        match &node.0.kind {
            ArrayKind::Uniform(value) => Some(value.clone()),
            ArrayKind::Values(items) => items.get(index).cloned(),
            ArrayKind::Deferred(slots) => slots.get(index).map(Future::current),
            _ => None,
        }
    }
}

impl Iterator for Values {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(leaf) = self.leaf.as_mut() {
                match Self::next_in_leaf(leaf) {
                    Some(value) => {
                        self.remaining -= 1;
                        return Some(value);
                    }
                    None => self.leaf = None,
                }
            }
            let (node, offset, length, forward) = self.pending.pop()?;
            if length == 0 {
                continue;
            }
            match &node.0.kind {
                ArrayKind::Concat(left, right) => {
                    let left_length = left.0.length;
                    let left_part = left_length.saturating_sub(offset).min(length);
                    let head = (left.clone(), offset.min(left_length), left_part, forward);
                    let tail = (
                        right.clone(),
                        offset.saturating_sub(left_length),
                        length - left_part,
                        forward,
                    );
                    if forward {
                        self.pending.push(tail);
                        self.pending.push(head);
                    } else {
                        self.pending.push(head);
                        self.pending.push(tail);
                    }
                }
                ArrayKind::Section(base, base_offset) => {
                    self.pending
                        .push((base.clone(), base_offset + offset, length, forward));
                }
                ArrayKind::Reverse(base) => {
                    let start = node.0.length - offset - length;
                    self.pending.push((base.clone(), start, length, !forward));
                }
                _ => {
                    let start = if forward { offset } else { offset + length };
                    self.leaf = Some((node.clone(), start, length, forward));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Values {}

impl Sequence for FemArray {
    type Item = Value;

    fn length(&self) -> usize {
        self.0.length
    }

    fn get(&self, index: usize) -> FemResult<Value> {
        check_index(index, self.0.length)?;
        let mut node = self;
        let mut index = index;
        loop {
            match &node.0.kind {
                ArrayKind::Concat(left, right) => {
                    if index < left.0.length {
                        node = left;
                    } else {
                        index -= left.0.length;
                        node = right;
                    }
                }
                ArrayKind::Section(base, offset) => {
                    index += offset;
                    node = base;
                }
                ArrayKind::Reverse(base) => {
                    index = node.0.length - 1 - index;
                    node = base;
                }
                ArrayKind::Uniform(value) => return Ok(value.clone()),
                ArrayKind::Values(items) => return Ok(items[index].clone()),
                ArrayKind::Deferred(slots) => return Ok(slots[index].current()),
                ArrayKind::Empty => return Err(FemError::index(index, 0)),
            }
        }
    }

    fn section(&self, offset: usize, length: usize) -> FemResult<FemArray> {
        check_range(offset, length, self.0.length)?;
        Ok(self.section_unchecked(offset, length))
    }

    fn concat(&self, other: &FemArray) -> FemArray {
        if other.0.length == 0 {
            return self.clone();
        }
        if self.0.length == 0 {
            return other.clone();
        }
        Self::view(
            self.0.length + other.0.length,
            ArrayKind::Concat(self.clone(), other.clone()),
        )
    }

    fn reverse(&self) -> FemArray {
        match &self.0.kind {
            ArrayKind::Reverse(base) => base.clone(),
            ArrayKind::Empty | ArrayKind::Uniform(_) => self.clone(),
            _ if self.0.length == 1 => self.clone(),
            _ => Self::view(self.0.length, ArrayKind::Reverse(self.clone())),
        }
    }

    fn compact(&self) -> FemArray {
        match &self.0.kind {
            ArrayKind::Empty
            | ArrayKind::Uniform(_)
            | ArrayKind::Values(_)
            | ArrayKind::Deferred(_) => self.clone(),
            _ => {
                let compacted = Self::from_values(self.to_vec());
                let hash = self.0.hash.load(Ordering::Relaxed);
                compacted.0.hash.store(hash, Ordering::Relaxed);
                compacted
            }
        }
    }

    fn export<C: Collector<Value>>(
        &self,
        collector: &mut C,
        offset: usize,
        length: usize,
        forward: bool,
    ) -> FemResult<bool> {
        check_range(offset, length, self.0.length)?;
        Ok(self.export_unchecked(collector, offset, length, forward))
    }
}

impl From<Vec<Value>> for FemArray {
    fn from(values: Vec<Value>) -> Self {
        FemArray::from_values(values)
    }
}

impl FromIterator<Value> for FemArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        FemArray::from_values(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Lossy: an element that fails to evaluate compares unequal.
impl PartialEq for FemArray {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl std::hash::Hash for FemArray {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code().unwrap_or(0));
    }
}

impl fmt::Debug for FemArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> FemArray {
        values.iter().map(|&v| Value::integer(v)).collect()
    }

    #[test]
    fn test_concat_section_round_trip() {
        let a = ints(&[1, 2, 3]);
        let b = ints(&[4, 5]);
        let joined = a.concat(&b);
        assert_eq!(joined.length(), 5);
        assert_eq!(joined.section(0, 3).unwrap(), a);
        assert_eq!(joined.section(3, 2).unwrap(), b);
        assert_eq!(joined.get(4).unwrap(), Value::integer(5));
    }

    #[test]
    fn test_section_and_reverse_views() {
        let joined = ints(&[1, 2, 3]).concat(&ints(&[4, 5, 6]));
        let middle = joined.section(2, 2).unwrap();
        assert_eq!(middle, ints(&[3, 4]));
        let reversed = joined.reverse();
        assert_eq!(reversed, ints(&[6, 5, 4, 3, 2, 1]));
        assert_eq!(reversed.section(1, 3).unwrap(), ints(&[5, 4, 3]));
        assert!(Arc::ptr_eq(&reversed.reverse().0, &joined.0));
    }

    #[test]
    fn test_bounds_errors() {
        let array = ints(&[1, 2]);
        assert!(matches!(array.get(2), Err(FemError::Bounds(_))));
        assert!(matches!(array.section(1, 2), Err(FemError::Bounds(_))));
        assert!(matches!(array.find(&Value::integer(1), 3), Err(FemError::Bounds(_))));
    }

    #[test]
    fn test_hash_equality_consistency() {
        let a = ints(&[7, 8, 9]);
        let b = ints(&[7]).concat(&ints(&[8, 9]));
        assert!(a.equals(&b).unwrap());
        assert_eq!(a.hash_code().unwrap(), b.hash_code().unwrap());
        assert!(!a.equals(&ints(&[7, 8])).unwrap());
    }

    #[test]
    fn test_compact_materializes_views() {
        let view = ints(&[1, 2]).concat(&ints(&[3])).reverse();
        let compacted = view.compact();
        assert!(matches!(compacted.0.kind, ArrayKind::Values(_)));
        assert_eq!(compacted, ints(&[3, 2, 1]));
        assert!(Arc::ptr_eq(&compacted.compact().0, &compacted.0));
    }

    #[test]
    fn test_uniform_and_find() {
        let array = FemArray::uniform(Value::boolean(true), 3).concat(&ints(&[1, 2, 1]));
        assert_eq!(array.length(), 6);
        assert_eq!(array.find(&Value::integer(1), 0).unwrap(), Some(3));
        assert_eq!(array.find(&Value::integer(1), 4).unwrap(), Some(5));
        assert_eq!(array.find(&Value::integer(9), 0).unwrap(), None);
    }

    #[test]
    fn test_find_stops_at_first_match() {
        let failing = Future::new(
            crate::frame::Frame::empty(),
            crate::function::Function::native(
                "boom",
                |_frame| -> Result<Option<Value>, crate::error::BoxError> {
                    Err("evaluated past the match".into())
                },
            ),
        );
        let array = ints(&[1, 2]).concat(&FemArray::deferred(vec![failing.clone()]));
        assert_eq!(array.find(&Value::integer(2), 0).unwrap(), Some(1));
        assert!(!failing.ready());
        assert!(array.find(&Value::integer(3), 0).is_err());
    }

    #[test]
    fn test_iter_walks_views() {
        let joined = ints(&[1, 2, 3]).concat(&ints(&[4, 5]));
        let view = joined.reverse().section(1, 3).unwrap();
        assert_eq!(view.iter().len(), 3);
        assert_eq!(view.iter().collect::<Vec<_>>(), view.to_vec());
        assert_eq!(FemArray::from_values(view.iter().collect::<Vec<_>>()), ints(&[4, 3, 2]));
    }

    #[test]
    fn test_repeated_appends_stay_shallow() {
        let mut array = FemArray::empty();
        for index in 0..1_000 {
            array = array.concat(&ints(&[index]));
            assert!(array.0.depth <= MAX_DEPTH);
        }
        assert_eq!(array.length(), 1_000);
        assert_eq!(array.get(999).unwrap(), Value::integer(999));
        assert_eq!(array.find(&Value::integer(500), 0).unwrap(), Some(500));
    }

    #[test]
    fn test_concat_all_and_iter() {
        let parts = vec![ints(&[1]), ints(&[2, 3]), ints(&[]), ints(&[4])];
        let joined = FemArray::concat_all(&parts);
        let collected: Vec<i64> = joined
            .iter()
            .map(|v| match v {
                Value::Integer(i) => i,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(collected, vec![1, 2, 3, 4]);
    }
}
