//! The Augmented Prefix Tree Acceptor: the arena-backed graph over which the
//! merge engine ([`crate::merger`]) operates.
//!
//! Nodes live in a single [`Vec`] and are addressed by [`NodeId`]; this sidesteps
//! the aliasing that raw/weak pointers would require for the two overlapping
//! trees (the `source` parent tree and the `representative` union-find forest)
//! that coexist on the same node set.
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::evaluator::Evaluator;
use crate::evaluator::Payload;
use crate::safety::SafetyNodeId;

/// Index into [`Apta::nodes`]. The root is always `NodeId(0)`.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
	pub const ROOT: NodeId = NodeId(0);

	fn index(self) -> usize {
		self.0 as usize
	}
}

impl std::fmt::Debug for NodeId {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_tuple("NodeId").field(&self.0).finish()
	}
}

/// A unique prefix of the training data.
#[derive(Debug, Clone)]
pub struct AptaNode {
	/// Stable identity for output/debug; equal to allocation order.
	pub number: u32,
	/// Label of the incoming transition (the symbol used to reach this node from `source`).
	pub label: u32,
	/// Trace-type tag of the incoming transition; `1` conventionally means accepting.
	pub trace_type: i32,
	pub source: Option<NodeId>,
	pub children: BTreeMap<u32, NodeId>,
	/// Union-find pointer; `None` iff this node is its own class root.
	pub representative: Option<NodeId>,
	/// Count of nodes in this equivalence class; meaningful only at the class root.
	pub size: u32,
	pub red: bool,
	pub data: Payload,
	/// `symbol -> node whose merge installed the conflict-resolution for this symbol`.
	pub det_undo: BTreeMap<u32, NodeId>,
	pub safety_node: Option<SafetyNodeId>,
}

impl AptaNode {
	fn new(number: u32, label: u32, trace_type: i32, source: Option<NodeId>, data: Payload) -> Self {
		Self {
			number,
			label,
			trace_type,
			source,
			children: BTreeMap::new(),
			representative: None,
			size: 1,
			red: false,
			data,
			det_undo: BTreeMap::new(),
			safety_node: None,
		}
	}
}

#[derive(Debug)]
pub struct Apta {
	nodes: Vec<AptaNode>,
	/// Bijection between symbol index and printable name.
	alphabet: Vec<String>,
}

impl Apta {
	pub fn new(alphabet: Vec<String>, root_data: Payload) -> Self {
		let root: AptaNode = AptaNode::new(0, 0, 0, None, root_data);
		Self { nodes: vec![root], alphabet }
	}

	pub fn root(&self) -> NodeId {
		NodeId::ROOT
	}

	pub fn alphabet(&self) -> &[String] {
		&self.alphabet
	}

	pub fn alphabet_size(&self) -> u32 {
		self.alphabet.len() as u32
	}

	pub fn node(&self, id: NodeId) -> &AptaNode {
		&self.nodes[id.index()]
	}

	pub fn node_mut(&mut self, id: NodeId) -> &mut AptaNode {
		&mut self.nodes[id.index()]
	}

	/// Disjoint mutable borrows of two distinct nodes. Panics if `a == b`.
	pub fn node_pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut AptaNode, &mut AptaNode) {
		assert_ne!(a, b, "node_pair_mut requires distinct ids");
		let (lo, hi): (NodeId, NodeId) = if a.index() < b.index() { (a, b) } else { (b, a) };
		let (left, right) = self.nodes.split_at_mut(hi.index());
		let lo_ref: &mut AptaNode = &mut left[lo.index()];
		let hi_ref: &mut AptaNode = &mut right[0];
		if a.index() < b.index() { (lo_ref, hi_ref) } else { (hi_ref, lo_ref) }
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Allocates a new node and, if `parent` already has a child on `symbol`,
	/// returns the existing child instead (traces share prefixes).
	pub fn get_or_insert_child(&mut self, parent: NodeId, symbol: u32, trace_type: i32, data: Payload) -> NodeId {
		if let Some(&existing) = self.nodes[parent.index()].children.get(&symbol) {
			return existing;
		}
		let number: u32 = self.nodes.len() as u32;
		let child: AptaNode = AptaNode::new(number, symbol, trace_type, Some(parent), data);
		let id: NodeId = NodeId(number);
		self.nodes.push(child);
		self.nodes[parent.index()].children.insert(symbol, id);
		id
	}

	/// Resolves through the union-find: follows `representative` to the class root.
	/// No path compression — see the module-level note in `merger` on why speculative
	/// merges require every `find` to walk the full, unmodified chain.
	pub fn find(&self, id: NodeId) -> NodeId {
		let mut current: NodeId = id;
		while let Some(rep) = self.nodes[current.index()].representative {
			current = rep;
		}
		current
	}

	/// `self.find(id).children[symbol].find()`, or `None` if absent.
	pub fn get_child(&self, id: NodeId, symbol: u32) -> Option<NodeId> {
		let root: NodeId = self.find(id);
		self.nodes[root.index()].children.get(&symbol).map(|&child| self.find(child))
	}

	/// Walks the representative chain starting at `start` (inclusive) until it finds
	/// the node whose `det_undo[symbol] == ancestor`; that node is the one a prior
	/// `merge` installed as the conflict-resolution target for `symbol` under `ancestor`.
	/// Returns `None` only if the APTA's invariants have been violated.
	pub fn find_until(&self, start: NodeId, ancestor: NodeId, symbol: u32) -> Option<NodeId> {
		let mut current: NodeId = start;
		loop {
			let node: &AptaNode = &self.nodes[current.index()];
			if node.det_undo.get(&symbol) == Some(&ancestor) {
				return Some(current);
			}
			current = node.representative?;
		}
	}

	/// DFS over the raw (un-merged) `children` map, starting at `node` (defaults to root).
	pub fn get_states(&self, node: Option<NodeId>) -> BTreeSet<NodeId> {
		let mut states: BTreeSet<NodeId> = BTreeSet::new();
		self.add_states(node.unwrap_or(self.root()), &mut states);
		states
	}

	fn add_states(&self, id: NodeId, states: &mut BTreeSet<NodeId>) {
		if !states.insert(id) {
			return;
		}
		for &child in self.nodes[id.index()].children.values() {
			self.add_states(child, states);
		}
	}

	/// DFS resolving every child through `find`, starting at `find(node)` (defaults to root).
	pub fn get_merged_states(&self, node: Option<NodeId>) -> BTreeSet<NodeId> {
		let start: NodeId = self.find(node.unwrap_or(self.root()));
		let mut states: BTreeSet<NodeId> = BTreeSet::new();
		self.add_merged_states(start, &mut states);
		states
	}

	fn add_merged_states(&self, id: NodeId, states: &mut BTreeSet<NodeId>) {
		if !states.insert(id) {
			return;
		}
		for &child in self.nodes[id.index()].children.values() {
			self.add_merged_states(self.find(child), states);
		}
	}

	pub fn get_accepting_states(&self) -> BTreeSet<NodeId> {
		self.get_states(None)
			.into_iter()
			.filter(|&id| self.node(id).trace_type == 1)
			.collect()
	}

	pub fn get_rejecting_states(&self) -> BTreeSet<NodeId> {
		self.get_states(None)
			.into_iter()
			.filter(|&id| self.node(id).trace_type != 1)
			.collect()
	}

	/// First child in symbol order, or `None` if this node has none.
	pub fn get_next_forward_node(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id.index()].children.values().next().copied()
	}

	/// Next sibling in symbol order, or the parent's next sibling (recursively),
	/// walking the raw `source`/`label` tree rather than the merged view.
	pub fn get_next_backward_node(&self, id: NodeId) -> Option<NodeId> {
		let node: &AptaNode = &self.nodes[id.index()];
		let source: NodeId = node.source?;
		let siblings: &BTreeMap<u32, NodeId> = &self.nodes[source.index()].children;
		let mut after_label: bool = false;
		for (&label, &sibling) in siblings {
			if after_label {
				return Some(sibling);
			}
			if label == node.label {
				after_label = true;
			}
		}
		self.get_next_backward_node(source)
	}

	/// Stable in-order traversal of the raw APTA: forward into the first child,
	/// else backward to the next sibling (or ancestor's next sibling).
	pub fn get_next_node(&self, id: NodeId) -> Option<NodeId> {
		self.get_next_forward_node(id).or_else(|| self.get_next_backward_node(id))
	}

	/// Inserts one trace (`trace_type`, `(symbol, data)*`) starting from the root,
	/// sharing prefixes with previously inserted traces. For every position, calls
	/// the active evaluator's `read_from` on the node the transition leaves and
	/// `read_to` on the node it arrives at, per `SPEC_FULL.md` §6.
	pub fn insert_trace(&mut self, evaluator: &dyn Evaluator, trace_type: i32, entries: &[(u32, String)]) {
		let length: usize = entries.len();
		let mut current: NodeId = self.root();
		for (index, (symbol, data)) in entries.iter().enumerate() {
			let child: NodeId = self.get_or_insert_child(current, *symbol, trace_type, evaluator.new_payload());
			let (source_node, dest_node) = self.node_pair_mut(current, child);
			evaluator.read_from(&mut source_node.data, trace_type, index, length, *symbol, data);
			evaluator.read_to(&mut dest_node.data, trace_type, index, length, *symbol, data);
			current = child;
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::evaluators::state_driven::StateDrivenPayload;

	fn fresh() -> Apta {
		Apta::new(vec!["a".to_owned(), "b".to_owned()], Payload::StateDriven(StateDrivenPayload::default()))
	}

	#[test]
	fn find_on_fresh_node_is_self() {
		let apta: Apta = fresh();
		assert_eq!(apta.find(apta.root()), apta.root());
	}

	#[test]
	fn get_or_insert_child_shares_prefixes() {
		let mut apta: Apta = fresh();
		let root: NodeId = apta.root();
		let c1: NodeId = apta.get_or_insert_child(root, 0, 1, Payload::StateDriven(StateDrivenPayload::default()));
		let c2: NodeId = apta.get_or_insert_child(root, 0, 1, Payload::StateDriven(StateDrivenPayload::default()));
		assert_eq!(c1, c2);
		assert_eq!(apta.len(), 2);
	}

	#[test]
	fn find_until_locates_det_undo_entry() {
		let mut apta: Apta = fresh();
		let root: NodeId = apta.root();
		let a: NodeId = apta.get_or_insert_child(root, 0, 1, Payload::StateDriven(StateDrivenPayload::default()));
		let b: NodeId = apta.get_or_insert_child(root, 1, 1, Payload::StateDriven(StateDrivenPayload::default()));
		apta.node_mut(a).det_undo.insert(0, b);
		assert_eq!(apta.find_until(a, b, 0), Some(a));
		assert_eq!(apta.find_until(a, root, 0), None);
	}

	#[test]
	fn forward_backward_iteration_is_stable() {
		let mut apta: Apta = fresh();
		let root: NodeId = apta.root();
		let a: NodeId = apta.get_or_insert_child(root, 0, 1, Payload::StateDriven(StateDrivenPayload::default()));
		let b: NodeId = apta.get_or_insert_child(root, 1, 1, Payload::StateDriven(StateDrivenPayload::default()));
		assert_eq!(apta.get_next_forward_node(root), Some(a));
		assert_eq!(apta.get_next_backward_node(a), Some(b));
		assert_eq!(apta.get_next_node(root), Some(a));
		assert_eq!(apta.get_next_node(a), Some(b));
		assert_eq!(apta.get_next_node(b), None);
	}
}
