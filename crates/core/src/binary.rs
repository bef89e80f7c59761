//! Byte sequences with structural sharing
//!
//! [`FemBinary`] uses the same rope layout as [`FemString`](crate::FemString)
//! with plain bytes as elements. Bytes compare unsigned. The text form is
//! `0x` followed by two uppercase hex digits per byte.

use crate::error::{FemError, FemResult};
use crate::sequence::{
    Collector, HASH_INIT, MAX_DEPTH, Sequence, check_index, check_range, hash_finish, hash_push,
    partial_matches,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, LazyLock};

/// Immutable sequence of bytes.
#[derive(Clone)]
pub struct FemBinary(Arc<BinaryNode>);

struct BinaryNode {
    length: usize,
    /// Cached hash; 0 until computed.
    hash: AtomicU32,
    /// 0 for leaves.
    depth: u16,
    kind: BinaryKind,
}

enum BinaryKind {
    Empty,
    Uniform(u8),
    Bytes(Box<[u8]>),
    Concat(FemBinary, FemBinary),
    Section(FemBinary, usize),
    Reverse(FemBinary),
}

impl BinaryKind {
    fn depth(&self) -> u16 {
        match self {
            BinaryKind::Concat(left, right) => left.0.depth.max(right.0.depth) + 1,
            BinaryKind::Section(base, _) | BinaryKind::Reverse(base) => base.0.depth + 1,
            _ => 0,
        }
    }

    fn detach(&mut self, pending: &mut Vec<FemBinary>) {
        match std::mem::replace(self, BinaryKind::Empty) {
            BinaryKind::Concat(left, right) => {
                pending.push(left);
                pending.push(right);
            }
            BinaryKind::Section(base, _) | BinaryKind::Reverse(base) => pending.push(base),
            leaf => *self = leaf,
        }
    }
}

impl Drop for BinaryNode {
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

static EMPTY: LazyLock<FemBinary> = LazyLock::new(|| FemBinary::node(0, BinaryKind::Empty));

impl FemBinary {
    fn node(length: usize, kind: BinaryKind) -> Self {
        FemBinary(Arc::new(BinaryNode {
            length,
            hash: AtomicU32::new(0),
            depth: kind.depth(),
            kind,
        }))
    }

    fn view(length: usize, kind: BinaryKind) -> Self {
        let view = Self::node(length, kind);
        if view.0.depth > MAX_DEPTH {
            tracing::trace!(length, "flattening deep binary view");
            return Self::from_bytes(view.to_vec());
        }
        view
    }

    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        match bytes.as_slice() {
            [] => Self::empty(),
            [single] => Self::uniform(*single, 1),
            _ => Self::node(bytes.len(), BinaryKind::Bytes(bytes.into_boxed_slice())),
        }
    }

    /// `length` copies of `byte`.
    pub fn uniform(byte: u8, length: usize) -> Self {
        if length == 0 {
            return Self::empty();
        }
        Self::node(length, BinaryKind::Uniform(byte))
    }

    /// The low `length` bytes of `value` (at most 8), in the given byte order.
    pub fn from_integer(value: i64, length: usize, big_endian: bool) -> FemResult<Self> {
        if length > 8 {
            return Err(FemError::Bounds(format!(
                "integer binary length {} exceeds 8",
                length
            )));
        }
        let bytes = if big_endian {
            value.to_be_bytes()[8 - length..].to_vec()
        } else {
            value.to_le_bytes()[..length].to_vec()
        };
        Ok(Self::from_bytes(bytes))
    }

    /// Parses the `0x`-prefixed hex form produced by `Display`.
    pub fn from_hex(text: &str) -> FemResult<Self> {
        let digits = text.strip_prefix("0x").ok_or_else(|| {
            FemError::Conversion(format!("binary text must start with 0x: {:?}", text))
        })?;
        if digits.len() % 2 != 0 {
            return Err(FemError::Conversion(format!(
                "binary text has an odd number of digits: {:?}",
                text
            )));
        }
        let bytes = digits
            .as_bytes()
            .chunks(2)
            .map(|pair| Ok((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
            .collect::<FemResult<Vec<u8>>>()?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn concat_all(parts: &[FemBinary]) -> Self {
        match parts {
            [] => Self::empty(),
            [single] => single.clone(),
            _ => {
                let mid = parts.len() / 2;
                Self::concat_all(&parts[..mid]).concat(&Self::concat_all(&parts[mid..]))
            }
        }
    }

    pub fn ptr_eq(&self, other: &FemBinary) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Front-to-back walk over the bytes.
    pub fn bytes(&self) -> Bytes {
        Bytes {
            pending: vec![(self.clone(), 0, self.0.length, true)],
            leaf: None,
            remaining: self.0.length,
        }
    }

    /// Reads the bytes as a two's complement integer of their length (at
    /// most 8), sign-extended.
    pub fn to_integer(&self, big_endian: bool) -> FemResult<i64> {
        let length = self.0.length;
        if length > 8 {
            return Err(FemError::Bounds(format!(
                "binary of {} bytes does not fit an integer",
                length
            )));
        }
        if length == 0 {
            return Ok(0);
        }
        let mut bytes = self.to_vec();
        if !big_endian {
            bytes.reverse();
        }
        let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut word = [fill; 8];
        word[8 - length..].copy_from_slice(&bytes);
        Ok(i64::from_be_bytes(word))
    }

    /// Cached FNV-style hash over the bytes.
    pub fn hash_code(&self) -> u32 {
        let cached = self.0.hash.load(AtomicOrdering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut hash = HASH_INIT;
        self.export_unchecked(
            &mut |byte: u8| {
                hash = hash_push(hash, u32::from(byte));
                true
            },
            0,
            self.0.length,
            true,
        );
        let hash = hash_finish(hash);
        self.0.hash.store(hash, AtomicOrdering::Relaxed);
        hash
    }

    /// Length, then hash, then bytes in lockstep.
    pub fn equals(&self, other: &FemBinary) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.length != other.0.length || self.hash_code() != other.hash_code() {
            return false;
        }
        self.bytes().eq(other.bytes())
    }

    /// Lexicographic by unsigned byte, shorter first on a common prefix.
    pub fn compare(&self, other: &FemBinary) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.bytes().cmp(other.bytes())
    }

    /// Position of the first `byte` at or after `offset`.
    pub fn find(&self, byte: u8, offset: usize) -> FemResult<Option<usize>> {
        check_range(offset, 0, self.0.length)?;
        let mut position = offset;
        let exhausted = self.export_unchecked(
            &mut |item: u8| {
                if item == byte {
                    return false;
                }
                position += 1;
                true
            },
            offset,
            self.0.length - offset,
            true,
        );
        Ok(if exhausted { None } else { Some(position) })
    }

    /// Position of the first occurrence of `needle` at or after `offset`.
    pub fn find_binary(&self, needle: &FemBinary, offset: usize) -> FemResult<Option<usize>> {
        check_range(offset, 0, self.0.length)?;
        if needle.is_empty() {
            return Ok(Some(offset));
        }
        let needle = needle.to_vec();
        let fallback = partial_matches(&needle);
        let mut matched = 0;
        let mut position = offset;
        let mut found = None;
        self.export_unchecked(
            &mut |byte: u8| {
                while matched > 0 && needle[matched] != byte {
                    matched = fallback[matched - 1];
                }
                if needle[matched] == byte {
                    matched += 1;
                }
                position += 1;
                if matched == needle.len() {
                    found = Some(position - matched);
                    return false;
                }
                true
            },
            offset,
            self.0.length - offset,
            true,
        );
        Ok(found)
    }

    /// Hex text, with or without the `0x` prefix.
    pub fn to_hex(&self, header: bool) -> String {
        let mut text = String::with_capacity(self.0.length * 2 + 2);
        if header {
            text.push_str("0x");
        }
        self.export_unchecked(
            &mut |byte: u8| {
                text.push(HEX[usize::from(byte >> 4)] as char);
                text.push(HEX[usize::from(byte & 0x0F)] as char);
                true
            },
            0,
            self.0.length,
            true,
        );
        text
    }

    fn section_unchecked(&self, offset: usize, length: usize) -> FemBinary {
        if length == 0 {
            return Self::empty();
        }
        if offset == 0 && length == self.0.length {
            return self.clone();
        }
        match &self.0.kind {
            BinaryKind::Uniform(byte) => Self::uniform(*byte, length),
            BinaryKind::Section(base, base_offset) => {
                base.section_unchecked(base_offset + offset, length)
            }
            BinaryKind::Concat(left, right) => {
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
            BinaryKind::Reverse(base) => base
                .section_unchecked(self.0.length - offset - length, length)
                .reverse(),
            _ => Self::view(length, BinaryKind::Section(self.clone(), offset)),
        }
    }

    fn export_unchecked<C: Collector<u8>>(
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
            BinaryKind::Empty => true,
            BinaryKind::Uniform(byte) => (0..length).all(|_| collector.push(*byte)),
            BinaryKind::Bytes(items) => {
                let items = &items[offset..offset + length];
                if forward {
                    items.iter().all(|&byte| collector.push(byte))
                } else {
                    items.iter().rev().all(|&byte| collector.push(byte))
                }
            }
            BinaryKind::Concat(left, right) => {
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
            BinaryKind::Section(base, base_offset) => {
                base.export_unchecked(collector, base_offset + offset, length, forward)
            }
            BinaryKind::Reverse(base) => base.export_unchecked(
                collector,
                self.0.length - offset - length,
                length,
                !forward,
            ),
        }
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(digit: u8) -> FemResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(FemError::Conversion(format!(
            "invalid hex digit {:?}",
            char::from(other)
        ))),
    }
}

/// Pull-style walk over a binary produced by [`FemBinary::bytes`].
pub struct Bytes {
    pending: Vec<(FemBinary, usize, usize, bool)>,
    leaf: Option<(FemBinary, usize, usize, bool)>,
    remaining: usize,
}

impl Bytes {
    fn next_in_leaf(leaf: &mut (FemBinary, usize, usize, bool)) -> Option<u8> {
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
            BinaryKind::Uniform(byte) => Some(*byte),
            BinaryKind::Bytes(items) => items.get(index).copied(),
            _ => None,
        }
    }
}

impl Iterator for Bytes {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if let Some(leaf) = self.leaf.as_mut() {
                match Self::next_in_leaf(leaf) {
                    Some(byte) => {
                        self.remaining -= 1;
                        return Some(byte);
                    }
                    None => self.leaf = None,
                }
            }
            let (node, offset, length, forward) = self.pending.pop()?;
            if length == 0 {
                continue;
            }
            match &node.0.kind {
                BinaryKind::Concat(left, right) => {
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
                BinaryKind::Section(base, base_offset) => {
                    self.pending
                        .push((base.clone(), base_offset + offset, length, forward));
                }
                BinaryKind::Reverse(base) => {
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

impl ExactSizeIterator for Bytes {}

impl Sequence for FemBinary {
    type Item = u8;

    fn length(&self) -> usize {
        self.0.length
    }

    fn get(&self, index: usize) -> FemResult<u8> {
        check_index(index, self.0.length)?;
        let mut node = self;
        let mut index = index;
        loop {
            match &node.0.kind {
                BinaryKind::Concat(left, right) => {
                    if index < left.0.length {
                        node = left;
                    } else {
                        index -= left.0.length;
                        node = right;
                    }
                }
                BinaryKind::Section(base, offset) => {
                    index += offset;
                    node = base;
                }
                BinaryKind::Reverse(base) => {
                    index = node.0.length - 1 - index;
                    node = base;
                }
                BinaryKind::Uniform(byte) => return Ok(*byte),
                BinaryKind::Bytes(items) => return Ok(items[index]),
                BinaryKind::Empty => return Err(FemError::index(index, 0)),
            }
        }
    }

    fn section(&self, offset: usize, length: usize) -> FemResult<FemBinary> {
        check_range(offset, length, self.0.length)?;
        Ok(self.section_unchecked(offset, length))
    }

    fn concat(&self, other: &FemBinary) -> FemBinary {
        if other.0.length == 0 {
            return self.clone();
        }
        if self.0.length == 0 {
            return other.clone();
        }
        Self::view(
            self.0.length + other.0.length,
            BinaryKind::Concat(self.clone(), other.clone()),
        )
    }

    fn reverse(&self) -> FemBinary {
        match &self.0.kind {
            BinaryKind::Reverse(base) => base.clone(),
            BinaryKind::Empty | BinaryKind::Uniform(_) => self.clone(),
            _ => Self::view(self.0.length, BinaryKind::Reverse(self.clone())),
        }
    }

    fn compact(&self) -> FemBinary {
        match &self.0.kind {
            BinaryKind::Empty | BinaryKind::Uniform(_) | BinaryKind::Bytes(_) => self.clone(),
            _ => {
                let compacted = Self::from_bytes(self.to_vec());
                let hash = self.0.hash.load(AtomicOrdering::Relaxed);
                compacted.0.hash.store(hash, AtomicOrdering::Relaxed);
                compacted
            }
        }
    }

    fn export<C: Collector<u8>>(
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

impl From<&[u8]> for FemBinary {
    fn from(bytes: &[u8]) -> Self {
        FemBinary::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for FemBinary {
    fn from(bytes: Vec<u8>) -> Self {
        FemBinary::from_bytes(bytes)
    }
}

impl PartialEq for FemBinary {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for FemBinary {}

impl PartialOrd for FemBinary {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FemBinary {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl std::hash::Hash for FemBinary {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code());
    }
}

impl fmt::Display for FemBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex(true))
    }
}

impl fmt::Debug for FemBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binary({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(bytes: &[u8]) -> FemBinary {
        FemBinary::from(bytes)
    }

    #[test]
    fn test_concat_section_round_trip() {
        let a = b(&[1, 2, 3]);
        let c = b(&[4, 5]);
        let joined = a.concat(&c);
        assert_eq!(joined.length(), 5);
        assert_eq!(joined.section(0, 3).unwrap(), a);
        assert_eq!(joined.section(3, 2).unwrap(), c);
        assert_eq!(joined.get(4).unwrap(), 5);
        assert!(matches!(joined.get(5), Err(FemError::Bounds(_))));
    }

    #[test]
    fn test_reverse_and_compact() {
        let joined = b(&[1, 2, 3]).concat(&b(&[4, 5, 6]));
        let reversed = joined.reverse();
        assert_eq!(reversed.to_vec(), vec![6, 5, 4, 3, 2, 1]);
        assert!(reversed.reverse().ptr_eq(&joined));
        assert_eq!(reversed.section(1, 3).unwrap().to_vec(), vec![5, 4, 3]);
        let compacted = reversed.compact();
        assert!(matches!(compacted.0.kind, BinaryKind::Bytes(_)));
        assert_eq!(compacted, reversed);
        assert!(compacted.compact().ptr_eq(&compacted));
    }

    #[test]
    fn test_compare_is_unsigned() {
        assert_eq!(b(&[0x7F]).compare(&b(&[0x80])), Ordering::Less);
        assert_eq!(b(&[1, 2]).compare(&b(&[1])), Ordering::Greater);
        assert_eq!(b(&[1, 2]).compare(&b(&[1]).concat(&b(&[2]))), Ordering::Equal);
    }

    #[test]
    fn test_hash_equality_consistency() {
        let a = b(&[9, 8, 7, 6]);
        let c = b(&[9, 8]).concat(&b(&[7, 6]));
        assert_eq!(a, c);
        assert_eq!(a.hash_code(), c.hash_code());
        assert_ne!(a, b(&[9, 8, 7]));
    }

    #[test]
    fn test_find() {
        let data = b(&[1, 2, 1, 2, 3]).concat(&b(&[1, 2, 3]));
        assert_eq!(data.find(3, 0).unwrap(), Some(4));
        assert_eq!(data.find(3, 5).unwrap(), Some(7));
        assert_eq!(data.find(9, 0).unwrap(), None);
        assert_eq!(data.find_binary(&b(&[1, 2, 3]), 0).unwrap(), Some(2));
        assert_eq!(data.find_binary(&b(&[1, 2, 3]), 3).unwrap(), Some(5));
        assert_eq!(data.find_binary(&FemBinary::empty(), 4).unwrap(), Some(4));
        assert!(data.find(1, 9).is_err());
    }

    #[test]
    fn test_hex_text() {
        let data = b(&[0x00, 0xAB, 0x7f]);
        assert_eq!(data.to_string(), "0x00AB7F");
        assert_eq!(data.to_hex(false), "00AB7F");
        assert_eq!(FemBinary::from_hex("0x00ab7F").unwrap(), data);
        assert!(FemBinary::from_hex("00AB").is_err());
        assert!(FemBinary::from_hex("0xABC").is_err());
        assert!(FemBinary::from_hex("0xZZ").is_err());
        assert!(FemBinary::from_hex("0x").unwrap().is_empty());
    }

    #[test]
    fn test_integer_round_trip() {
        let big = FemBinary::from_integer(0x0102_0304, 3, true).unwrap();
        assert_eq!(big.to_vec(), vec![0x02, 0x03, 0x04]);
        let little = FemBinary::from_integer(0x0102_0304, 3, false).unwrap();
        assert_eq!(little.to_vec(), vec![0x04, 0x03, 0x02]);
        assert_eq!(big.to_integer(true).unwrap(), 0x02_0304);
        assert_eq!(little.to_integer(false).unwrap(), 0x02_0304);
        assert_eq!(b(&[0xFF, 0xFE]).to_integer(true).unwrap(), -2);
        assert!(FemBinary::from_integer(1, 9, true).is_err());
        assert!(FemBinary::uniform(0, 9).to_integer(true).is_err());
    }

    #[test]
    fn test_bytes_walk_views() {
        let view = b(&[1, 2, 3]).concat(&b(&[4, 5])).reverse().section(1, 3).unwrap();
        assert_eq!(view.bytes().len(), 3);
        assert_eq!(view.bytes().collect::<Vec<_>>(), vec![4, 3, 2]);
    }

    #[test]
    fn test_repeated_appends_stay_shallow() {
        let mut data = FemBinary::empty();
        for index in 0..1_000u32 {
            data = data.concat(&FemBinary::uniform((index % 251) as u8, 1));
            assert!(data.0.depth <= MAX_DEPTH);
        }
        assert_eq!(data.length(), 1_000);
        assert_eq!(data.get(999).unwrap(), (999 % 251) as u8);
    }
}
