//! Code-point strings with structural sharing
//!
//! A [`FemString`] is a rope of code points. Leaves come in several widths:
//!
//! - **narrow**: UTF-8, one to four bytes per code point
//! - **medium**: UTF-16, one or two units per code point
//! - **wide**: one `u32` per code point
//!
//! plus the compact fixed-width leaves `compact()` produces (one, two or four
//! bytes per code point, chosen by the largest code point). Narrow and medium
//! leaves pay O(k) for random access when multi-unit code points precede the
//! index; fixed-width leaves are O(1).
//!
//! Views (`Concat`, `Section`, `Reverse`) are O(1) to build and never copy.
//! A view that would nest deeper than a fixed bound is flattened on the spot,
//! so ropes grown one append at a time pay an amortized copy instead of an
//! unbounded tree. Dropping a rope is iterative.

use crate::error::{FemError, FemResult};
use crate::sequence::{
    Collector, HASH_INIT, MAX_DEPTH, Sequence, check_index, check_range, hash_finish, hash_push,
    partial_matches,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, LazyLock};

/// Leaf width selection for strings built from host text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    /// ASCII text stays narrow; anything else gets the smallest fixed width.
    #[default]
    Auto,
    /// UTF-8 leaf.
    Narrow,
    /// UTF-16 leaf.
    Medium,
    /// One `u32` per code point.
    Wide,
}

impl std::str::FromStr for StringEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(StringEncoding::Auto),
            "narrow" | "utf8" => Ok(StringEncoding::Narrow),
            "medium" | "utf16" => Ok(StringEncoding::Medium),
            "wide" | "utf32" => Ok(StringEncoding::Wide),
            other => Err(format!("unknown string encoding '{}'", other)),
        }
    }
}

/// Immutable sequence of code points.
#[derive(Clone)]
pub struct FemString(Arc<StringNode>);

struct StringNode {
    length: usize,
    /// Cached hash; 0 until computed.
    hash: AtomicU32,
    /// 0 for leaves.
    depth: u16,
    kind: StringKind,
}

enum StringKind {
    Empty,
    Uniform(u32),
    Narrow(Box<str>),
    Medium(Box<[u16]>),
    Fixed8(Box<[u8]>),
    Fixed16(Box<[u16]>),
    Fixed32(Box<[u32]>),
    Concat(FemString, FemString),
    /// Base and offset; the length lives on the node.
    Section(FemString, usize),
    Reverse(FemString),
}

impl StringKind {
    fn depth(&self) -> u16 {
        match self {
            StringKind::Concat(left, right) => left.0.depth.max(right.0.depth) + 1,
            StringKind::Section(base, _) | StringKind::Reverse(base) => base.0.depth + 1,
            _ => 0,
        }
    }

    /// Moves child views into `pending`, leaving leaves in place.
    fn detach(&mut self, pending: &mut Vec<FemString>) {
        match std::mem::replace(self, StringKind::Empty) {
            StringKind::Concat(left, right) => {
                pending.push(left);
                pending.push(right);
            }
            StringKind::Section(base, _) | StringKind::Reverse(base) => pending.push(base),
            leaf => *self = leaf,
        }
    }
}

impl Drop for StringNode {
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

static EMPTY: LazyLock<FemString> = LazyLock::new(|| FemString::node(0, StringKind::Empty));

impl FemString {
    fn node(length: usize, kind: StringKind) -> Self {
        FemString(Arc::new(StringNode {
            length,
            hash: AtomicU32::new(0),
            depth: kind.depth(),
            kind,
        }))
    }

    /// A view node, flattened if it would exceed the depth bound.
    fn view(length: usize, kind: StringKind) -> Self {
        let view = Self::node(length, kind);
        if view.0.depth > MAX_DEPTH {
            tracing::trace!(length, "flattening deep string view");
            return Self::from_code_points(&view.to_code_points());
        }
        view
    }

    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// A string of `length` copies of `code_point`.
    pub fn uniform(code_point: u32, length: usize) -> Self {
        if length == 0 {
            return Self::empty();
        }
        Self::node(length, StringKind::Uniform(code_point))
    }

    /// Builds a string from host text with an explicit leaf width.
    pub fn with_encoding(text: &str, encoding: StringEncoding) -> Self {
        if text.is_empty() {
            return Self::empty();
        }
        match encoding {
            StringEncoding::Narrow => {
                Self::node(text.chars().count(), StringKind::Narrow(text.into()))
            }
            StringEncoding::Medium => {
                let units: Box<[u16]> = text.encode_utf16().collect();
                Self::node(text.chars().count(), StringKind::Medium(units))
            }
            StringEncoding::Wide => {
                let points: Box<[u32]> = text.chars().map(u32::from).collect();
                Self::node(points.len(), StringKind::Fixed32(points))
            }
            StringEncoding::Auto if text.is_ascii() => {
                Self::node(text.len(), StringKind::Narrow(text.into()))
            }
            StringEncoding::Auto => {
                let points: Vec<u32> = text.chars().map(u32::from).collect();
                Self::from_code_points(&points)
            }
        }
    }

    /// Builds a medium leaf from UTF-16 units, rejecting unpaired surrogates.
    pub fn from_utf16(units: &[u16]) -> FemResult<Self> {
        let mut length = 0;
        for decoded in char::decode_utf16(units.iter().copied()) {
            if let Err(err) = decoded {
                return Err(FemError::Conversion(format!(
                    "invalid UTF-16 input: unpaired surrogate {:#06x}",
                    err.unpaired_surrogate()
                )));
            }
            length += 1;
        }
        if length == 0 {
            return Ok(Self::empty());
        }
        Ok(Self::node(length, StringKind::Medium(units.into())))
    }

    /// Builds a fixed-width leaf sized to the largest code point.
    pub fn from_code_points(points: &[u32]) -> Self {
        let Some(&max) = points.iter().max() else {
            return Self::empty();
        };
        let kind = if max <= 0xFF {
            StringKind::Fixed8(points.iter().map(|&cp| cp as u8).collect())
        } else if max <= 0xFFFF {
            StringKind::Fixed16(points.iter().map(|&cp| cp as u16).collect())
        } else {
            StringKind::Fixed32(points.into())
        };
        Self::node(points.len(), kind)
    }

    /// Concatenates many strings as a balanced tree.
    pub fn concat_all(parts: &[FemString]) -> Self {
        match parts {
            [] => Self::empty(),
            [single] => single.clone(),
            _ => {
                let mid = parts.len() / 2;
                Self::concat_all(&parts[..mid]).concat(&Self::concat_all(&parts[mid..]))
            }
        }
    }

    /// Identity comparison of the underlying node.
    pub fn ptr_eq(&self, other: &FemString) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True for leaves with O(1) random access.
    pub fn is_compact(&self) -> bool {
        match &self.0.kind {
            StringKind::Empty
            | StringKind::Uniform(_)
            | StringKind::Fixed8(_)
            | StringKind::Fixed16(_)
            | StringKind::Fixed32(_) => true,
            StringKind::Narrow(text) => text.len() == self.0.length,
            StringKind::Medium(units) => units.len() == self.0.length,
            _ => false,
        }
    }

    pub fn to_code_points(&self) -> Vec<u32> {
        self.to_vec()
    }

    /// Front-to-back walk over the code points.
    pub fn code_points(&self) -> CodePoints {
        CodePoints {
            pending: vec![(self.clone(), 0, self.0.length, true)],
            leaf: None,
            remaining: self.0.length,
        }
    }

    /// Cached FNV-style hash over the code points.
    pub fn hash_code(&self) -> u32 {
        let cached = self.0.hash.load(AtomicOrdering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut hash = HASH_INIT;
        self.export_unchecked(
            &mut |cp: u32| {
                hash = hash_push(hash, cp);
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

    /// Length, then hash, then code points.
    pub fn equals(&self, other: &FemString) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.length != other.0.length || self.hash_code() != other.hash_code() {
            return false;
        }
        self.code_points().eq(other.code_points())
    }

    /// Lexicographic by code point, shorter first on a common prefix.
    pub fn compare(&self, other: &FemString) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.code_points().cmp(other.code_points())
    }

    /// Position of the first `code_point` at or after `offset`.
    pub fn find(&self, code_point: u32, offset: usize) -> FemResult<Option<usize>> {
        check_range(offset, 0, self.0.length)?;
        let mut position = offset;
        let exhausted = self.export_unchecked(
            &mut |cp: u32| {
                if cp == code_point {
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
    pub fn find_string(&self, needle: &FemString, offset: usize) -> FemResult<Option<usize>> {
        check_range(offset, 0, self.0.length)?;
        if needle.is_empty() {
            return Ok(Some(offset));
        }
        let needle = needle.to_code_points();
        let fallback = partial_matches(&needle);
        let mut matched = 0;
        let mut position = offset;
        let mut found = None;
        self.export_unchecked(
            &mut |cp: u32| {
                while matched > 0 && needle[matched] != cp {
                    matched = fallback[matched - 1];
                }
                if needle[matched] == cp {
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

    fn section_unchecked(&self, offset: usize, length: usize) -> FemString {
        if length == 0 {
            return Self::empty();
        }
        if offset == 0 && length == self.0.length {
            return self.clone();
        }
        match &self.0.kind {
            StringKind::Uniform(cp) => Self::uniform(*cp, length),
            StringKind::Section(base, base_offset) => {
                base.section_unchecked(base_offset + offset, length)
            }
            StringKind::Concat(left, right) => {
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
            StringKind::Reverse(base) => base
                .section_unchecked(self.0.length - offset - length, length)
                .reverse(),
            _ => Self::view(length, StringKind::Section(self.clone(), offset)),
        }
    }

    fn export_unchecked<C: Collector<u32>>(
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
            StringKind::Empty => true,
            StringKind::Uniform(cp) => (0..length).all(|_| collector.push(*cp)),
            StringKind::Narrow(text) => {
                if forward {
                    text.chars()
                        .skip(offset)
                        .take(length)
                        .all(|c| collector.push(u32::from(c)))
                } else {
                    text.chars()
                        .rev()
                        .skip(self.0.length - offset - length)
                        .take(length)
                        .all(|c| collector.push(u32::from(c)))
                }
            }
            StringKind::Medium(units) => {
                let points = char::decode_utf16(units.iter().copied())
                    .map(|decoded| decoded.map_or(0xFFFD, u32::from))
                    .skip(offset)
                    .take(length);
                if forward {
                    points.into_iter().all(|cp| collector.push(cp))
                } else {
                    let points: Vec<u32> = points.collect();
                    points.into_iter().rev().all(|cp| collector.push(cp))
                }
            }
            StringKind::Fixed8(items) => {
                export_slice(&items[offset..offset + length], forward, collector, u32::from)
            }
            StringKind::Fixed16(items) => {
                export_slice(&items[offset..offset + length], forward, collector, u32::from)
            }
            StringKind::Fixed32(items) => {
                export_slice(&items[offset..offset + length], forward, collector, |cp| cp)
            }
            StringKind::Concat(left, right) => {
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
            StringKind::Section(base, base_offset) => {
                base.export_unchecked(collector, base_offset + offset, length, forward)
            }
            StringKind::Reverse(base) => base.export_unchecked(
                collector,
                self.0.length - offset - length,
                length,
                !forward,
            ),
        }
    }
}

/// Pull-style walk over a string produced by [`FemString::code_points`].
///
/// Views are unfolded on an explicit stack, so two strings can be walked in
/// lockstep without materializing either.
pub struct CodePoints {
    pending: Vec<(FemString, usize, usize, bool)>,
    leaf: Option<LeafWalk>,
    remaining: usize,
}

/// Position inside one leaf: an element index for fixed widths, a byte
/// offset for narrow leaves and a unit offset for medium leaves. Backward
/// walks keep the position one past the next element.
struct LeafWalk {
    node: FemString,
    position: usize,
    remaining: usize,
    forward: bool,
}

impl LeafWalk {
    fn new(node: FemString, offset: usize, length: usize, forward: bool) -> Self {
        let start = if forward { offset } else { offset + length };
        let position = match &node.0.kind {
            StringKind::Narrow(text) if text.len() != node.0.length => text
                .char_indices()
                .nth(start)
                .map_or(text.len(), |(byte, _)| byte),
            StringKind::Medium(units) if units.len() != node.0.length => {
                let mut unit = 0;
                for _ in 0..start {
                    unit += decode_at(units, unit).map_or(1, |(_, width)| width);
                }
                unit
            }
            _ => start,
        };
        LeafWalk {
            node,
            position,
            remaining: length,
            forward,
        }
    }

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let forward = self.forward;
        Some(match &self.node.0.kind {
            StringKind::Uniform(cp) => *cp,
            StringKind::Fixed8(items) => u32::from(items[step(&mut self.position, forward)]),
            StringKind::Fixed16(items) => u32::from(items[step(&mut self.position, forward)]),
            StringKind::Fixed32(items) => items[step(&mut self.position, forward)],
            StringKind::Narrow(text) => {
                let c = if forward {
                    text.get(self.position..)?.chars().next()?
                } else {
                    text.get(..self.position)?.chars().next_back()?
                };
                if forward {
                    self.position += c.len_utf8();
                } else {
                    self.position -= c.len_utf8();
                }
                u32::from(c)
            }
            StringKind::Medium(units) => {
                let (cp, width) = if forward {
                    decode_at(units, self.position)?
                } else {
                    decode_before(units, self.position)?
                };
                if forward {
                    self.position += width;
                } else {
                    self.position -= width;
                }
                cp
            }
            _ => return None,
        })
    }
}

fn step(position: &mut usize, forward: bool) -> usize {
    if forward {
        *position += 1;
        *position - 1
    } else {
        *position -= 1;
        *position
    }
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

fn combine_surrogates(high: u16, low: u16) -> u32 {
    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
}

/// Code point starting at `unit`, with its width in units.
fn decode_at(units: &[u16], unit: usize) -> Option<(u32, usize)> {
    let first = *units.get(unit)?;
    match units.get(unit + 1) {
        Some(&second) if is_high_surrogate(first) && is_low_surrogate(second) => {
            Some((combine_surrogates(first, second), 2))
        }
        _ if is_high_surrogate(first) || is_low_surrogate(first) => Some((0xFFFD, 1)),
        _ => Some((u32::from(first), 1)),
    }
}

/// Code point ending just before `unit`, with its width in units.
fn decode_before(units: &[u16], unit: usize) -> Option<(u32, usize)> {
    let last = *units.get(unit.checked_sub(1)?)?;
    let previous = unit.checked_sub(2).and_then(|index| units.get(index));
    match previous {
        Some(&high) if is_high_surrogate(high) && is_low_surrogate(last) => {
            Some((combine_surrogates(high, last), 2))
        }
        _ if is_high_surrogate(last) || is_low_surrogate(last) => Some((0xFFFD, 1)),
        _ => Some((u32::from(last), 1)),
    }
}

impl Iterator for CodePoints {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(walk) = self.leaf.as_mut() {
                match walk.next() {
                    Some(cp) => {
                        self.remaining -= 1;
                        return Some(cp);
                    }
                    None => self.leaf = None,
                }
            }
            let (node, offset, length, forward) = self.pending.pop()?;
            if length == 0 {
                continue;
            }
            match &node.0.kind {
                StringKind::Concat(left, right) => {
                    let left_length = left.0.length;
                    let left_part = left_length.saturating_sub(offset).min(length);
                    let head = (left.clone(), offset.min(left_length), left_part, forward);
                    let tail = (
                        right.clone(),
                        offset.saturating_sub(left_length),
                        length - left_part,
                        forward,
                    );
                    // The stack pops the part visited first last.
                    if forward {
                        self.pending.push(tail);
                        self.pending.push(head);
                    } else {
                        self.pending.push(head);
                        self.pending.push(tail);
                    }
                }
                StringKind::Section(base, base_offset) => {
                    self.pending
                        .push((base.clone(), base_offset + offset, length, forward));
                }
                StringKind::Reverse(base) => {
                    let start = node.0.length - offset - length;
                    self.pending.push((base.clone(), start, length, !forward));
                }
                _ => self.leaf = Some(LeafWalk::new(node.clone(), offset, length, forward)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for CodePoints {}

fn export_slice<T: Copy, C: Collector<u32>>(
    items: &[T],
    forward: bool,
    collector: &mut C,
    widen: impl Fn(T) -> u32,
) -> bool {
    if forward {
        items.iter().all(|&item| collector.push(widen(item)))
    } else {
        items.iter().rev().all(|&item| collector.push(widen(item)))
    }
}

impl Sequence for FemString {
    type Item = u32;

    fn length(&self) -> usize {
        self.0.length
    }

    fn get(&self, index: usize) -> FemResult<u32> {
        check_index(index, self.0.length)?;
        let mut node = self;
        let mut index = index;
        loop {
            match &node.0.kind {
                StringKind::Concat(left, right) => {
                    if index < left.0.length {
                        node = left;
                    } else {
                        index -= left.0.length;
                        node = right;
                    }
                }
                StringKind::Section(base, offset) => {
                    index += offset;
                    node = base;
                }
                StringKind::Reverse(base) => {
                    index = node.0.length - 1 - index;
                    node = base;
                }
                StringKind::Uniform(cp) => return Ok(*cp),
                StringKind::Fixed8(items) => return Ok(u32::from(items[index])),
                StringKind::Fixed16(items) => return Ok(u32::from(items[index])),
                StringKind::Fixed32(items) => return Ok(items[index]),
                StringKind::Narrow(text) => {
                    if text.len() == node.0.length {
                        return Ok(u32::from(text.as_bytes()[index]));
                    }
                    return text
                        .chars()
                        .nth(index)
                        .map(u32::from)
                        .ok_or_else(|| FemError::index(index, node.0.length));
                }
                StringKind::Medium(units) => {
                    if units.len() == node.0.length {
                        return Ok(u32::from(units[index]));
                    }
                    return char::decode_utf16(units.iter().copied())
                        .nth(index)
                        .map(|decoded| decoded.map_or(0xFFFD, u32::from))
                        .ok_or_else(|| FemError::index(index, node.0.length));
                }
                StringKind::Empty => return Err(FemError::index(index, 0)),
            }
        }
    }

    fn section(&self, offset: usize, length: usize) -> FemResult<FemString> {
        check_range(offset, length, self.0.length)?;
        Ok(self.section_unchecked(offset, length))
    }

    fn concat(&self, other: &FemString) -> FemString {
        if other.0.length == 0 {
            return self.clone();
        }
        if self.0.length == 0 {
            return other.clone();
        }
        if let (StringKind::Uniform(a), StringKind::Uniform(b)) = (&self.0.kind, &other.0.kind) {
            if a == b {
                return Self::uniform(*a, self.0.length + other.0.length);
            }
        }
        Self::view(
            self.0.length + other.0.length,
            StringKind::Concat(self.clone(), other.clone()),
        )
    }

    fn reverse(&self) -> FemString {
        match &self.0.kind {
            StringKind::Reverse(base) => base.clone(),
            StringKind::Empty | StringKind::Uniform(_) => self.clone(),
            _ if self.0.length == 1 => self.clone(),
            _ => Self::view(self.0.length, StringKind::Reverse(self.clone())),
        }
    }

    fn compact(&self) -> FemString {
        if self.is_compact() {
            return self.clone();
        }
        let compacted = Self::from_code_points(&self.to_code_points());
        // Carry the hash over if it is already known.
        let hash = self.0.hash.load(AtomicOrdering::Relaxed);
        compacted.0.hash.store(hash, AtomicOrdering::Relaxed);
        compacted
    }

    fn export<C: Collector<u32>>(
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

impl From<&str> for FemString {
    fn from(text: &str) -> Self {
        FemString::with_encoding(text, StringEncoding::Auto)
    }
}

impl From<String> for FemString {
    fn from(text: String) -> Self {
        FemString::from(text.as_str())
    }
}

impl PartialEq for FemString {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for FemString {}

impl PartialOrd for FemString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FemString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl std::hash::Hash for FemString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code());
    }
}

impl fmt::Display for FemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let StringKind::Narrow(text) = &self.0.kind {
            return f.write_str(text);
        }
        let mut result = Ok(());
        self.export_unchecked(
            &mut |cp: u32| {
                result = fmt::Write::write_char(f, char::from_u32(cp).unwrap_or('\u{FFFD}'));
                result.is_ok()
            },
            0,
            self.0.length,
            true,
        );
        result
    }
}

impl fmt::Debug for FemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> FemString {
        FemString::from(text)
    }

    fn is_leaf(string: &FemString) -> bool {
        !matches!(
            string.0.kind,
            StringKind::Concat(..) | StringKind::Section(..) | StringKind::Reverse(_)
        )
    }

    #[test]
    fn test_leaf_widths_agree() {
        let text = "grüße 🌍!";
        let narrow = FemString::with_encoding(text, StringEncoding::Narrow);
        let medium = FemString::with_encoding(text, StringEncoding::Medium);
        let wide = FemString::with_encoding(text, StringEncoding::Wide);
        let auto = FemString::from(text);

        assert_eq!(narrow.length(), 8);
        assert_eq!(medium.length(), 8);
        assert_eq!(narrow, medium);
        assert_eq!(medium, wide);
        assert_eq!(wide, auto);
        assert_eq!(medium.get(6).unwrap(), 0x1F30D);
        assert_eq!(narrow.get(7).unwrap(), '!' as u32);
        assert!(auto.is_compact());
        assert!(!narrow.is_compact());
    }

    #[test]
    fn test_get_out_of_bounds() {
        let text = s("abc");
        assert!(matches!(text.get(3), Err(FemError::Bounds(_))));
        assert!(matches!(FemString::empty().get(0), Err(FemError::Bounds(_))));
    }

    #[test]
    fn test_concat_section_round_trip() {
        let a = s("hello, ");
        let b = FemString::with_encoding("wörld", StringEncoding::Medium);
        let joined = a.concat(&b);
        assert_eq!(joined.length(), a.length() + b.length());
        assert_eq!(joined.section(0, a.length()).unwrap(), a);
        assert_eq!(joined.section(a.length(), b.length()).unwrap(), b);
        assert_eq!(joined.to_string(), "hello, wörld");
    }

    #[test]
    fn test_concat_empty_returns_operand() {
        let a = s("abc");
        let joined = a.concat(&FemString::empty());
        assert!(Arc::ptr_eq(&joined.0, &a.0));
        let joined = FemString::empty().concat(&a);
        assert!(Arc::ptr_eq(&joined.0, &a.0));
    }

    #[test]
    fn test_section_collapses_over_concat() {
        let joined = s("abc").concat(&s("def"));
        let left = joined.section(1, 2).unwrap();
        assert!(matches!(left.0.kind, StringKind::Section(..)));
        assert_eq!(left.to_string(), "bc");

        let right = joined.section(3, 3).unwrap();
        assert_eq!(right.to_string(), "def");
        assert!(matches!(right.0.kind, StringKind::Narrow(_)));

        let middle = joined.section(2, 2).unwrap();
        assert!(matches!(middle.0.kind, StringKind::Concat(..)));
        assert_eq!(middle.to_string(), "cd");

        // A section of a section points at the original base.
        let nested = left.section(1, 1).unwrap();
        match &nested.0.kind {
            StringKind::Section(base, offset) => {
                assert_eq!(*offset, 2);
                assert!(is_leaf(base));
            }
            _ => panic!("expected section"),
        }
    }

    #[test]
    fn test_section_validation() {
        let text = s("abc");
        assert!(text.section(1, 3).is_err());
        assert!(text.section(4, 0).is_err());
        assert!(text.section(3, 0).unwrap().is_empty());
        let whole = text.section(0, 3).unwrap();
        assert!(Arc::ptr_eq(&whole.0, &text.0));
    }

    #[test]
    fn test_reverse_involution() {
        let text = s("abc").concat(&s("déf"));
        let reversed = text.reverse();
        assert_eq!(reversed.to_string(), "fédcba");
        let back = reversed.reverse();
        assert!(Arc::ptr_eq(&back.0, &text.0));
        assert_eq!(reversed.get(0).unwrap(), 'f' as u32);
        assert_eq!(reversed.section(1, 3).unwrap().to_string(), "édc");
    }

    #[test]
    fn test_export_backwards_with_stop() {
        let text = s("abcdef");
        let mut seen = String::new();
        let finished = text
            .export(
                &mut |cp: u32| {
                    seen.push(char::from_u32(cp).unwrap());
                    seen.len() < 3
                },
                1,
                4,
                false,
            )
            .unwrap();
        assert!(!finished);
        assert_eq!(seen, "edc");
    }

    #[test]
    fn test_hash_equality_consistency() {
        let a = s("abcdef");
        let b = s("abc").concat(&s("def"));
        let c = FemString::with_encoding("abcdef", StringEncoding::Medium).reverse().reverse();
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_eq!(a.hash_code(), c.hash_code());
        assert_ne!(a, s("abcdeg"));
        assert_ne!(a.hash_code(), 0);
    }

    #[test]
    fn test_compact_flattens_views() {
        let view = s("ab").concat(&FemString::from("ç€𝄞")).reverse();
        let compacted = view.compact();
        assert!(compacted.is_compact());
        assert!(matches!(compacted.0.kind, StringKind::Fixed32(_)));
        assert_eq!(compacted, view);
        let again = compacted.compact();
        assert!(Arc::ptr_eq(&again.0, &compacted.0));
    }

    #[test]
    fn test_compact_picks_smallest_width() {
        assert!(matches!(FemString::from("é").0.kind, StringKind::Fixed8(_)));
        assert!(matches!(FemString::from("€").0.kind, StringKind::Fixed16(_)));
        assert!(matches!(FemString::from("𝄞").0.kind, StringKind::Fixed32(_)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(s("abc").compare(&s("abd")), Ordering::Less);
        assert_eq!(s("abc").compare(&s("ab")), Ordering::Greater);
        assert_eq!(s("ab").compare(&s("abc")), Ordering::Less);
        assert_eq!(s("abc").compare(&s("ab").concat(&s("c"))), Ordering::Equal);
    }

    #[test]
    fn test_find() {
        let text = s("banana");
        assert_eq!(text.find('n' as u32, 0).unwrap(), Some(2));
        assert_eq!(text.find('n' as u32, 3).unwrap(), Some(4));
        assert_eq!(text.find('x' as u32, 0).unwrap(), None);
        assert_eq!(text.find_string(&s("ana"), 2).unwrap(), Some(3));
        assert_eq!(text.find_string(&s("nab"), 0).unwrap(), None);
        assert!(text.find('a' as u32, 7).is_err());
    }

    #[test]
    fn test_uniform_concat_merges() {
        let a = FemString::uniform('x' as u32, 3);
        let b = FemString::uniform('x' as u32, 2);
        let joined = a.concat(&b);
        assert!(matches!(joined.0.kind, StringKind::Uniform(_)));
        assert_eq!(joined.to_string(), "xxxxx");
    }

    #[test]
    fn test_from_utf16_rejects_lone_surrogate() {
        assert!(FemString::from_utf16(&[0x61, 0xD800]).is_err());
        let ok = FemString::from_utf16(&[0x61, 0xD834, 0xDD1E]).unwrap();
        assert_eq!(ok.length(), 2);
        assert_eq!(ok.get(1).unwrap(), 0x1D11E);
    }

    #[test]
    fn test_code_points_walk_views_in_both_directions() {
        let narrow = FemString::with_encoding("aé𝄞b", StringEncoding::Narrow);
        let medium = FemString::with_encoding("x𝄞ü", StringEncoding::Medium);
        let joined = narrow.concat(&medium);
        let expected: Vec<u32> = "aé𝄞bx𝄞ü".chars().map(u32::from).collect();
        assert_eq!(joined.code_points().collect::<Vec<_>>(), expected);
        assert_eq!(joined.code_points().len(), 7);

        let reversed: Vec<u32> = expected.iter().rev().copied().collect();
        assert_eq!(joined.reverse().code_points().collect::<Vec<_>>(), reversed);
        let middle = joined.reverse().section(1, 4).unwrap();
        assert_eq!(middle.code_points().collect::<Vec<_>>(), reversed[1..5].to_vec());
        assert_eq!(middle.to_code_points(), reversed[1..5].to_vec());
    }

    #[test]
    fn test_equality_across_leaf_shapes() {
        let narrow = FemString::with_encoding("grüße 🌍", StringEncoding::Narrow);
        let medium = FemString::with_encoding("grüße 🌍", StringEncoding::Medium).reverse();
        assert!(narrow.equals(&medium.reverse()));
        assert_eq!(narrow.compare(&medium.reverse()), Ordering::Equal);
        assert_eq!(
            narrow.compare(&FemString::with_encoding("grüßf", StringEncoding::Medium)),
            Ordering::Less
        );
    }

    #[test]
    fn test_find_string_with_overlapping_prefix() {
        let text = s("aab").concat(&s("aaab"));
        assert_eq!(text.find_string(&s("aaab"), 0).unwrap(), Some(3));
        assert_eq!(text.find_string(&s("ab"), 2).unwrap(), Some(5));
        assert_eq!(text.find_string(&s("b"), 6).unwrap(), Some(6));
        assert_eq!(text.find_string(&s("ba"), 0).unwrap(), Some(2));
        assert_eq!(partial_matches(&[1, 1, 2, 1, 1, 1]), vec![0, 1, 0, 1, 2, 2]);
    }

    #[test]
    fn test_repeated_appends_stay_shallow() {
        let mut text = FemString::empty();
        for index in 0..2_000u32 {
            text = text.concat(&FemString::uniform('a' as u32 + index % 26, 1));
            assert!(text.0.depth <= MAX_DEPTH);
        }
        assert_eq!(text.length(), 2_000);
        assert_eq!(text.get(1_999).unwrap(), 'a' as u32 + 1_999 % 26);
        assert_eq!(text.reverse().get(0).unwrap(), text.get(1_999).unwrap());
    }

    #[test]
    fn test_concat_all_is_balanced() {
        let parts: Vec<FemString> = ["a", "b", "c", "d", "e"].iter().map(|p| s(p)).collect();
        let joined = FemString::concat_all(&parts);
        assert_eq!(joined.to_string(), "abcde");
    }
}
