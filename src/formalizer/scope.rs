//! Lexical scope frames used by the formalizer.
//!
//! A `ScopeStack` is a vector of frames addressed by position; lookup walks
//! from the innermost (last) frame outward. Frames inherited from a parent
//! formalizer sit below `base` and are never popped by the child.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Classification bits recorded for an identifier in scope.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IdentFlags(u32);

impl IdentFlags {
    pub const NONE: IdentFlags = IdentFlags(0);
    pub const IS_KEYSPACE: IdentFlags = IdentFlags(1 << 0);
    pub const IS_VARIABLE: IdentFlags = IdentFlags(1 << 1);
    pub const IS_STATIC_VAR: IdentFlags = IdentFlags(1 << 2);
    pub const IS_UNNEST_ALIAS: IdentFlags = IdentFlags(1 << 3);
    pub const IS_EXPR_TERM: IdentFlags = IdentFlags(1 << 4);
    pub const IS_SUBQ_TERM: IdentFlags = IdentFlags(1 << 5);
    pub const IS_UNKNOWN: IdentFlags = IdentFlags(1 << 6);
    pub const IS_WITH_ALIAS: IdentFlags = IdentFlags(1 << 7);

    /// Bits copied from a scope entry onto a resolved identifier node.
    pub const CLASSIFICATION: IdentFlags = IdentFlags(
        Self::IS_KEYSPACE.0
            | Self::IS_VARIABLE.0
            | Self::IS_STATIC_VAR.0
            | Self::IS_UNNEST_ALIAS.0
            | Self::IS_EXPR_TERM.0
            | Self::IS_SUBQ_TERM.0
            | Self::IS_WITH_ALIAS.0,
    );

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: IdentFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: IdentFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// A keyspace alias carrying no other classification.
    pub fn is_keyspace_only(self) -> bool {
        self == Self::IS_KEYSPACE
    }
}

impl BitOr for IdentFlags {
    type Output = IdentFlags;
    fn bitor(self, rhs: Self) -> Self {
        IdentFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for IdentFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for IdentFlags {
    type Output = IdentFlags;
    fn bitand(self, rhs: Self) -> Self {
        IdentFlags(self.0 & rhs.0)
    }
}

impl Not for IdentFlags {
    type Output = IdentFlags;
    fn not(self) -> Self {
        IdentFlags(!self.0)
    }
}

impl fmt::Debug for IdentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(IdentFlags, &str); 8] = [
            (IdentFlags::IS_KEYSPACE, "KEYSPACE"),
            (IdentFlags::IS_VARIABLE, "VARIABLE"),
            (IdentFlags::IS_STATIC_VAR, "STATIC_VAR"),
            (IdentFlags::IS_UNNEST_ALIAS, "UNNEST_ALIAS"),
            (IdentFlags::IS_EXPR_TERM, "EXPR_TERM"),
            (IdentFlags::IS_SUBQ_TERM, "SUBQ_TERM"),
            (IdentFlags::IS_UNKNOWN, "UNKNOWN"),
            (IdentFlags::IS_WITH_ALIAS, "WITH_ALIAS"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "IdentFlags(NONE)")
        } else {
            write!(f, "IdentFlags({})", names.join(" | "))
        }
    }
}

/// One lexical level: identifier name to classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeFrame {
    entries: HashMap<String, IdentFlags>,
}

impl ScopeFrame {
    pub fn get(&self, name: &str) -> Option<IdentFlags> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, flags: IdentFlags) {
        self.entries.insert(name.into(), flags);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, IdentFlags)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
    base: usize,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    /// A root stack with a single empty frame.
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::default()],
            base: 0,
        }
    }

    /// A stack whose lookups fall through to a snapshot of `parent`.
    pub fn chained(parent: &ScopeStack) -> Self {
        let mut frames = parent.frames.clone();
        frames.push(ScopeFrame::default());
        let base = frames.len() - 1;
        Self { frames, base }
    }

    /// Innermost entry for `name`, walking outward.
    pub fn lookup(&self, name: &str) -> Option<IdentFlags> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Entry for `name` defined by this stack's own frames (not inherited).
    pub fn lookup_local(&self, name: &str) -> Option<IdentFlags> {
        self.frames[self.base..]
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
    }

    pub fn current(&self) -> &ScopeFrame {
        // frames always holds at least the base frame
        &self.frames[self.frames.len() - 1]
    }

    pub fn set(&mut self, name: impl Into<String>, flags: IdentFlags) {
        let last = self.frames.len() - 1;
        self.frames[last].insert(name, flags);
    }

    pub fn push_frame(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    /// Remove the innermost frame; the base frame is never removed.
    pub fn pop_frame(&mut self) -> Option<ScopeFrame> {
        if self.frames.len() - 1 > self.base {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Number of levels owned by this stack, including its base frame.
    pub fn depth(&self) -> usize {
        self.frames.len() - self.base
    }
}
