// Timer trees: the recursive snapshot agents send (TimerNode) and the arena the
// collector merges into (TimerTree).
//
// Children are keyed by name within a parent and keep first-appearance order.
// Counts and durations add with saturation; `extended` and `active` only ever
// go from false to true.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// Timer snapshot as reported by an agent (one per thread of execution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerNode {
    pub name: String,
    #[serde(default)]
    pub extended: bool,
    pub total_nanos: u64,
    pub count: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub children: Vec<TimerNode>,
}

impl TimerNode {
    pub fn new(name: impl Into<String>, total_nanos: u64, count: u64) -> Self {
        Self {
            name: name.into(),
            extended: false,
            total_nanos,
            count,
            active: false,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: TimerNode) -> Self {
        self.children.push(child);
        self
    }
}

/// One arena slot. `children` holds arena indices in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct TimerSlot {
    pub name: String,
    pub extended: bool,
    pub total_nanos: u64,
    pub count: u64,
    pub active: bool,
    pub children: Vec<u32>,
}

impl TimerSlot {
    fn empty(name: &str, extended: bool) -> Self {
        Self {
            name: name.to_owned(),
            extended,
            total_nanos: 0,
            count: 0,
            active: false,
            children: Vec::new(),
        }
    }
}

/// Merge target for timer snapshots. Slot 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct TimerTree {
    nodes: Vec<TimerSlot>,
}

const ROOT: usize = 0;

impl TimerTree {
    /// Empty tree whose root has the given name and zero totals.
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![TimerSlot::empty(root_name, false)],
        }
    }

    pub fn from_node(node: &TimerNode) -> Self {
        let mut tree = Self {
            nodes: vec![TimerSlot::empty(&node.name, node.extended)],
        };
        tree.merge(node);
        tree
    }

    pub fn root(&self) -> &TimerSlot {
        &self.nodes[ROOT]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[ROOT].count == 0
    }

    /// Merges a snapshot into the root. A zero-count snapshot is a no-op.
    pub fn merge(&mut self, source: &TimerNode) {
        self.merge_at(ROOT, source);
    }

    /// Merges another tree into this one. `other` is borrowed immutably, so a
    /// tree can never be merged into itself.
    pub fn merge_tree(&mut self, other: &TimerTree) {
        self.merge(&other.to_node());
    }

    fn merge_at(&mut self, idx: usize, source: &TimerNode) {
        if source.count == 0 {
            return;
        }
        {
            let slot = &mut self.nodes[idx];
            slot.count = slot.count.saturating_add(source.count);
            slot.total_nanos = slot.total_nanos.saturating_add(source.total_nanos);
            slot.active |= source.active;
            slot.extended |= source.extended;
        }
        for child in &source.children {
            if child.count == 0 {
                continue;
            }
            let child_idx = match self.find_child(idx, &child.name) {
                Some(existing) => existing,
                None => self.push_child(idx, &child.name, child.extended),
            };
            self.merge_at(child_idx, child);
        }
    }

    fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .map(|&c| c as usize)
            .find(|&c| self.nodes[c].name == name)
    }

    fn push_child(&mut self, parent: usize, name: &str, extended: bool) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TimerSlot::empty(name, extended));
        self.nodes[parent].children.push(idx as u32);
        idx
    }

    /// Looks up a node by its name path below the root (empty path = root).
    pub fn find(&self, path: &[&str]) -> Option<&TimerSlot> {
        let mut idx = ROOT;
        for name in path {
            idx = self.find_child(idx, name)?;
        }
        Some(&self.nodes[idx])
    }

    /// Child names of the node at `path`, in merge order.
    pub fn child_names(&self, path: &[&str]) -> Vec<&str> {
        let Some(node) = self.find(path) else {
            return Vec::new();
        };
        node.children
            .iter()
            .map(|&c| self.nodes[c as usize].name.as_str())
            .collect()
    }

    pub fn to_node(&self) -> TimerNode {
        self.node_at(ROOT)
    }

    fn node_at(&self, idx: usize) -> TimerNode {
        let slot = &self.nodes[idx];
        TimerNode {
            name: slot.name.clone(),
            extended: slot.extended,
            total_nanos: slot.total_nanos,
            count: slot.count,
            active: slot.active,
            children: slot
                .children
                .iter()
                .map(|&c| self.node_at(c as usize))
                .collect(),
        }
    }

    /// Checks the arena invariants after decoding from storage: every child
    /// index points forward and names are unique per parent.
    pub fn is_well_formed(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        self.nodes.iter().enumerate().all(|(i, slot)| {
            let mut seen = std::collections::HashSet::new();
            slot.children.iter().all(|&c| {
                let c = c as usize;
                c > i && c < self.nodes.len() && seen.insert(self.nodes[c].name.as_str())
            })
        })
    }
}
