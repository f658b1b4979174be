use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;

#[derive(Default)]
struct Node {
    children: HashMap<CompactString, Node, FxBuildHasher>,
    terminal: bool,
}

/// Suffix set over DNS name patterns, stored as a reversed-label trie.
///
/// `example.org.` is stored as the path `.` -> `org` -> `example`, with the
/// deepest node marked terminal. A lookup walks labels right to left and
/// matches at the first terminal node, so any name under a stored pattern
/// matches without substring comparison. Adding `.` marks the root label
/// terminal and matches every fully-qualified name.
///
/// Inputs are expected to be normalized (see [`crate::name::normalize`]);
/// the trie itself never case-folds or validates.
#[derive(Default)]
pub struct DomainSet {
    root: Node,
}

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Inserts a name pattern. Inserting a name whose suffix is already
    /// terminal is a no-op, so the trie never stores entries shadowed by a
    /// shorter pattern.
    pub fn add(&mut self, name: &str) {
        let mut node = &mut self.root;
        for label in rev_labels(name) {
            if let Some(child) = node.children.get(label) {
                if child.terminal {
                    return;
                }
            }
            node = node.children.entry(CompactString::new(label)).or_default();
        }
        node.terminal = true;
    }

    /// True when some suffix of `name` is a stored pattern.
    pub fn contains(&self, name: &str) -> bool {
        let mut node = &self.root;
        for label in rev_labels(name) {
            match node.children.get(label) {
                Some(child) if child.terminal => return true,
                Some(child) => node = child,
                None => return false,
            }
        }
        false
    }
}

/// Labels of `name` from rightmost to leftmost. A trailing dot is the root
/// label and is yielded first, as its own entry.
fn rev_labels(name: &str) -> impl Iterator<Item = &str> {
    let (body, fqdn) = match name.strip_suffix('.') {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    fqdn.then_some(".")
        .into_iter()
        .chain(body.rsplit('.').filter(|label| !label.is_empty()))
}
