//! Read recording.
//!
//! While a record frame is open, the store notes every path it reads. A
//! *check* read means the whole value matters; a *keys* read means only the
//! set of keys matters. A check on a node makes everything recorded below it
//! redundant, so marks below a check are dropped.
//!
//! Closing a frame yields a [`RecordSnapshot`]: the recorded tree plus the
//! state it was recorded against. Comparing the snapshot with a later state
//! tells whether any recorded read would now see something different.

use crate::{Data, Path, Seg};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadMode {
    Check,
    Keys,
}

/// One node of the recorded read tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordNode {
    check: bool,
    keys: bool,
    children: BTreeMap<String, RecordNode>,
}

impl RecordNode {
    /// Whether the node's value was read as a whole.
    pub fn is_check(&self) -> bool {
        self.check
    }

    /// Whether the node's key set was read.
    pub fn is_keys(&self) -> bool {
        self.keys
    }

    pub fn children(&self) -> &BTreeMap<String, RecordNode> {
        &self.children
    }

    pub(crate) fn mark(&mut self, path: &[Seg], mode: ReadMode) {
        if self.check {
            return;
        }
        match path.split_first() {
            None => match mode {
                ReadMode::Check => {
                    self.check = true;
                    self.keys = false;
                    self.children.clear();
                }
                ReadMode::Keys => self.keys = true,
            },
            Some((first, rest)) => self
                .children
                .entry(first.to_key())
                .or_default()
                .mark(rest, mode),
        }
    }

    pub(crate) fn merge(&mut self, other: RecordNode) {
        if self.check {
            return;
        }
        if other.check {
            *self = other;
            return;
        }
        self.keys |= other.keys;
        for (key, child) in other.children {
            self.children.entry(key).or_default().merge(child);
        }
    }

    /// Whether every read recorded here sees the same thing in `new` as it
    /// did in `old`.
    pub(crate) fn unchanged(&self, old: &Data, new: &Data) -> bool {
        if old.same(new) {
            return true;
        }
        if self.check {
            return false;
        }
        if self.keys && old.keys() != new.keys() {
            return false;
        }
        self.children.iter().all(|(key, child)| {
            let seg = Seg::key(key.as_str());
            child.unchanged(&old.child(&seg), &new.child(&seg))
        })
    }
}

/// The reads of one closed record frame.
#[derive(Clone, Debug, Default)]
pub struct RecordSnapshot {
    pub(crate) root: RecordNode,
    pub(crate) state: Data,
}

impl RecordSnapshot {
    /// The recorded read tree.
    pub fn reads(&self) -> &RecordNode {
        &self.root
    }

    /// The state the reads were recorded against.
    pub fn state(&self) -> &Data {
        &self.state
    }

    /// Whether nothing was read.
    pub fn is_empty(&self) -> bool {
        self.root == RecordNode::default()
    }

    /// Compare against `state` instead of the recorded one.
    pub fn unchanged_between(&self, old: &Data, new: &Data) -> bool {
        self.root.unchanged(old, new)
    }
}

/// Open record frames. Reads go to the innermost frame; closing a frame
/// folds it into its parent.
#[derive(Debug, Default)]
pub(crate) struct RecordStack {
    frames: Vec<RecordNode>,
    suspended: usize,
}

impl RecordStack {
    pub fn is_recording(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self) {
        self.frames.push(RecordNode::default());
    }

    /// Close the innermost frame. Unless discarded, its reads also count for
    /// the enclosing frame.
    pub fn pop(&mut self, discard: bool) -> Option<RecordNode> {
        let frame = self.frames.pop()?;
        if !discard {
            if let Some(parent) = self.frames.last_mut() {
                parent.merge(frame.clone());
            }
        }
        Some(frame)
    }

    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    pub fn record(&mut self, path: &Path, mode: ReadMode) {
        if self.suspended > 0 {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.mark(path.segments(), mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn data(value: serde_json::Value) -> Data {
        Data::from(value)
    }

    // ========================================================================
    // Marking
    // ========================================================================

    #[test]
    fn test_check_coarsens_children() {
        let mut root = RecordNode::default();
        root.mark(path!("a", "b").segments(), ReadMode::Check);
        root.mark(path!("a").segments(), ReadMode::Check);
        let a = &root.children()["a"];
        assert!(a.is_check());
        assert!(a.children().is_empty());

        root.mark(path!("a", "c").segments(), ReadMode::Check);
        assert!(root.children()["a"].children().is_empty());
    }

    #[test]
    fn test_stack_merges_into_parent() {
        let mut stack = RecordStack::default();
        stack.push();
        stack.push();
        stack.record(&path!("x"), ReadMode::Check);
        let inner = stack.pop(false).unwrap();
        assert!(inner.children()["x"].is_check());
        let outer = stack.pop(false).unwrap();
        assert!(outer.children()["x"].is_check());
        assert!(!stack.is_recording());
    }

    #[test]
    fn test_discarded_frame_not_merged() {
        let mut stack = RecordStack::default();
        stack.push();
        stack.push();
        stack.record(&path!("x"), ReadMode::Check);
        stack.pop(true);
        assert_eq!(stack.pop(false).unwrap(), RecordNode::default());
    }

    #[test]
    fn test_suspended_reads_ignored() {
        let mut stack = RecordStack::default();
        stack.push();
        stack.suspend();
        stack.record(&path!("x"), ReadMode::Check);
        stack.resume();
        assert_eq!(stack.pop(false).unwrap(), RecordNode::default());
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    #[test]
    fn test_unrelated_change_is_unchanged() {
        let old = data(json!({"a": {"x": 1}, "b": 2}));
        let new = crate::set_at_path(&old, &path!("b"), Data::from(3.0)).unwrap();
        let mut root = RecordNode::default();
        root.mark(path!("a", "x").segments(), ReadMode::Check);
        assert!(root.unchanged(&old, &new));

        root.mark(path!("b").segments(), ReadMode::Check);
        assert!(!root.unchanged(&old, &new));
    }

    #[test]
    fn test_keys_read_sees_added_key() {
        let old = data(json!({"items": {"a": 1}}));
        let new = crate::set_at_path(&old, &path!("items", "b"), Data::from(2.0)).unwrap();
        let same_keys = crate::set_at_path(&old, &path!("items", "a"), Data::from(5.0)).unwrap();
        let mut root = RecordNode::default();
        root.mark(path!("items").segments(), ReadMode::Keys);
        assert!(!root.unchanged(&old, &new));
        assert!(root.unchanged(&old, &same_keys));
    }
}
