//! Safety filter (C6) and its YAML adapter (C10): a reference DFA over boolean
//! formulas of alphabet symbols, used to veto merges that would conflate APTA
//! states reached under different safety obligations.
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use serde::Deserialize;

use crate::apta::Apta;
use crate::apta::NodeId;

/// Index into [`SafetyDfa::nodes`].
#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct SafetyNodeId(u32);

impl SafetyNodeId {
	fn index(self) -> usize {
		self.0 as usize
	}
}

#[derive(Debug)]
struct SafetyDfaNode {
	name: String,
	is_accepting: bool,
	outgoing: BTreeMap<String, SafetyNodeId>,
}

/// A compiled safety automaton: nodes with named, formula-labeled edges.
#[derive(Debug)]
pub struct SafetyDfa {
	nodes: Vec<SafetyDfaNode>,
	name_to_id: BTreeMap<String, SafetyNodeId>,
	start: SafetyNodeId,
	alphabet: BTreeSet<String>,
	empty_transition_sym: String,
}

/// Raw deserialization target for the §6 YAML schema.
#[derive(Debug, Deserialize)]
pub struct SafetyDfaSpec {
	pub alphabet_size: u32,
	pub num_states: u32,
	pub final_transition_sym: String,
	pub empty_transition_sym: String,
	pub start_state: String,
	pub smooth_transitions: bool,
	pub nodes: BTreeMap<String, SafetyNodeSpec>,
	pub edges: BTreeMap<String, BTreeMap<String, EdgeSpec>>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyNodeSpec {
	pub is_accepting: bool,
}

#[derive(Debug, Deserialize)]
pub struct EdgeSpec {
	pub symbols: Vec<String>,
}

/// Fatal errors compiling or evaluating a safety DFA; all are reachable from
/// untrusted YAML input or trace content and therefore returned, never panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
	UndeclaredNode { name: String },
	UnknownStartState { name: String },
	EmptyFormula,
	MalformedFormula { formula: String },
	UnsafeTraces { node: u32 },
}

impl std::fmt::Display for SafetyError {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::UndeclaredNode { name } => write!(fmt, "node `{name}` referenced in edges is not declared in nodes"),
			Self::UnknownStartState { name } => write!(fmt, "start_state `{name}` is not declared in nodes"),
			Self::EmptyFormula => write!(fmt, "formula contains no symbol"),
			Self::MalformedFormula { formula } => write!(fmt, "formula `{formula}` has a symbol/operator count mismatch"),
			Self::UnsafeTraces { node } => write!(fmt, "unsafe traces: apta node {node} satisfies zero or more than one outgoing formula"),
		}
	}
}

impl SafetyDfa {
	/// Compiles a deserialized spec into the executable graph, validating that
	/// every edge endpoint (and the start state) names a declared node.
	pub fn from_spec(spec: SafetyDfaSpec) -> Result<Self, SafetyError> {
		let mut name_to_id: BTreeMap<String, SafetyNodeId> = BTreeMap::new();
		let mut nodes: Vec<SafetyDfaNode> = Vec::with_capacity(spec.nodes.len());
		for (name, node_spec) in &spec.nodes {
			let id: SafetyNodeId = SafetyNodeId(nodes.len() as u32);
			name_to_id.insert(name.clone(), id);
			nodes.push(SafetyDfaNode { name: name.clone(), is_accepting: node_spec.is_accepting, outgoing: BTreeMap::new() });
		}

		for (src_name, dests) in &spec.edges {
			let src_id: SafetyNodeId = *name_to_id.get(src_name).ok_or_else(|| SafetyError::UndeclaredNode { name: src_name.clone() })?;
			for (dst_name, edge) in dests {
				let dst_id: SafetyNodeId = *name_to_id.get(dst_name).ok_or_else(|| SafetyError::UndeclaredNode { name: dst_name.clone() })?;
				let Some(formula) = edge.symbols.first() else { continue };
				nodes[src_id.index()].outgoing.insert(formula.clone(), dst_id);
			}
		}

		let start: SafetyNodeId = *name_to_id.get(&spec.start_state).ok_or_else(|| SafetyError::UnknownStartState { name: spec.start_state.clone() })?;

		Ok(Self { nodes, name_to_id, start, alphabet: BTreeSet::new(), empty_transition_sym: spec.empty_transition_sym })
	}

	fn node(&self, id: SafetyNodeId) -> &SafetyDfaNode {
		&self.nodes[id.index()]
	}

	pub fn node_name(&self, id: SafetyNodeId) -> &str {
		&self.node(id).name
	}

	/// Walks the APTA from its root in BFS order, attaching the safety DFA node
	/// each APTA node satisfies exactly one formula into. Fatal on any node that
	/// satisfies zero or more than one outgoing formula (`SPEC_FULL.md` §4.6).
	pub fn initialize_apta(&mut self, apta: &mut Apta) -> Result<(), SafetyError> {
		for symbol in apta.alphabet() {
			self.alphabet.insert(symbol.clone());
		}

		apta.node_mut(apta.root()).safety_node = Some(self.start);

		let mut queue: VecDeque<NodeId> = VecDeque::new();
		queue.push_back(apta.root());

		while let Some(current) = queue.pop_front() {
			let safety_here: SafetyNodeId = apta.node(current).safety_node.expect("BFS only enqueues initialized nodes");
			let formulas: Vec<(String, SafetyNodeId)> = self.node(safety_here).outgoing.iter().map(|(formula, &dest)| (formula.clone(), dest)).collect();
			let children: Vec<(u32, NodeId)> = apta.node(current).children.iter().map(|(&symbol, &child)| (symbol, child)).collect();

			for (symbol_id, child) in children {
				let symbol: &str = &apta.alphabet()[symbol_id as usize];
				let mut dest: Option<SafetyNodeId> = None;
				let mut valid_count: u32 = 0;
				for (formula, candidate) in &formulas {
					if satisfy_formula(formula, symbol, &self.alphabet, &default_operators())? {
						valid_count += 1;
						dest = Some(*candidate);
					}
				}
				if valid_count != 1 {
					return Err(SafetyError::UnsafeTraces { node: apta.node(child).number });
				}
				apta.node_mut(child).safety_node = dest;
				queue.push_back(child);
			}
		}

		Ok(())
	}

	/// Polynomial pre-merge check: the two nodes' safety states must have the same name.
	pub fn pre_check_safety(&self, apta: &Apta, left: NodeId, right: NodeId) -> bool {
		let left_state: SafetyNodeId = apta.node(left).safety_node.expect("initialize_apta must run before merging");
		let right_state: SafetyNodeId = apta.node(right).safety_node.expect("initialize_apta must run before merging");
		self.node(left_state).name == self.node(right_state).name
	}

	/// Greedy post-merge check: BFS the product of the merged APTA with this DFA from
	/// the roots, rejecting if any reachable APTA transition satisfies zero safety formulas.
	pub fn post_check_safety(&self, apta: &Apta) -> bool {
		let mut visited: BTreeSet<(NodeId, SafetyNodeId)> = BTreeSet::new();
		let mut queue: VecDeque<(NodeId, SafetyNodeId)> = VecDeque::new();
		let root_pair: (NodeId, SafetyNodeId) = (apta.find(apta.root()), self.start);
		queue.push_back(root_pair);
		visited.insert(root_pair);

		while let Some((ql, qs)) = queue.pop_front() {
			let formulas: Vec<(String, SafetyNodeId)> = self.node(qs).outgoing.iter().map(|(formula, &dest)| (formula.clone(), dest)).collect();
			let children: Vec<(u32, NodeId)> = apta.node(ql).children.iter().map(|(&symbol, &child)| (symbol, child)).collect();

			for (symbol_id, child) in children {
				let symbol: &str = &apta.alphabet()[symbol_id as usize];
				let next_ql: NodeId = apta.find(child);
				let mut valid_count: u32 = 0;
				for (formula, next_qs) in &formulas {
					match satisfy_formula(formula, symbol, &self.alphabet, &default_operators()) {
						Ok(true) => {
							valid_count += 1;
							let pair: (NodeId, SafetyNodeId) = (next_ql, *next_qs);
							if visited.insert(pair) {
								queue.push_back(pair);
							}
						}
						_ => continue,
					}
				}
				if valid_count == 0 {
					return false;
				}
			}
		}

		true
	}

	pub fn is_accepting(&self, id: SafetyNodeId) -> bool {
		self.node(id).is_accepting
	}

	pub fn start(&self) -> SafetyNodeId {
		self.start
	}

	pub fn find_node(&self, name: &str) -> Option<SafetyNodeId> {
		self.name_to_id.get(name).copied()
	}
}

fn default_operators() -> BTreeMap<&'static str, fn(bool, bool) -> bool> {
	let mut ops: BTreeMap<&'static str, fn(bool, bool) -> bool> = BTreeMap::new();
	ops.insert(" & ", |a, b| a && b);
	ops.insert(" | ", |a, b| a || b);
	ops
}

/// Splits `formula` into its symbols and its operator tokens, in encounter order.
/// All operator tokens must be the same width (here, 3 characters) so replacing
/// each match with a fixed-width placeholder does not shift later positions.
fn separate_formula(formula: &str, operators: &BTreeMap<&'static str, fn(bool, bool) -> bool>) -> Result<(Vec<String>, Vec<String>), SafetyError> {
	const PLACEHOLDER: &str = " * ";
	let mut working: String = formula.to_owned();
	let mut positions: Vec<usize> = Vec::new();
	let mut operator_at: BTreeMap<usize, String> = BTreeMap::new();

	loop {
		let mut found_any: bool = false;
		for &op in operators.keys() {
			if let Some(pos) = working.find(op) {
				working.replace_range(pos..pos + op.len(), PLACEHOLDER);
				positions.push(pos);
				operator_at.insert(pos, op.to_owned());
				found_any = true;
			}
		}
		if !found_any {
			break;
		}
	}

	positions.sort_unstable();

	let mut symbols: Vec<String> = Vec::new();
	let mut ops_in_order: Vec<String> = Vec::new();

	if positions.is_empty() {
		symbols.push(formula.to_owned());
	} else {
		symbols.push(formula[..positions[0]].to_owned());
	}

	for (i, &pos) in positions.iter().enumerate() {
		let op: String = operator_at[&pos].clone();
		let start: usize = pos + op.len();
		ops_in_order.push(op);
		let end: usize = if i + 1 < positions.len() { positions[i + 1] } else { formula.len() };
		symbols.push(formula[start..end].to_owned());
	}

	if symbols.is_empty() {
		return Err(SafetyError::EmptyFormula);
	}
	if symbols.len() != ops_in_order.len() + 1 {
		return Err(SafetyError::MalformedFormula { formula: formula.to_owned() });
	}

	Ok((symbols, ops_in_order))
}

fn evaluate_symbol(symbol: &str, active: &str) -> bool {
	let (negated, name): (bool, &str) = match symbol.strip_prefix('!') {
		Some(rest) => (true, rest),
		None => (false, symbol),
	};
	let value: bool = name == active;
	if negated { !value } else { value }
}

/// Expands `formula` into atoms and operators, binds `sigma` true and every
/// other atom false, then folds left-to-right applying operators in the order
/// encountered. No precedence: this is a plain left fold, matching the
/// original tool's `satisfyFormula`.
pub fn satisfy_formula(formula: &str, sigma: &str, _alphabet: &BTreeSet<String>, operators: &BTreeMap<&'static str, fn(bool, bool) -> bool>) -> Result<bool, SafetyError> {
	let (symbols, ops): (Vec<String>, Vec<String>) = separate_formula(formula, operators)?;

	let mut current: bool = evaluate_symbol(&symbols[0], sigma);
	for (i, op) in ops.iter().enumerate() {
		let next: bool = evaluate_symbol(&symbols[i + 1], sigma);
		let apply: fn(bool, bool) -> bool = *operators.get(op.as_str()).expect("operator token came from this map's own keys");
		current = apply(current, next);
	}

	Ok(current)
}

#[cfg(test)]
mod test {
	use super::*;

	fn spec_with_two_states() -> SafetyDfaSpec {
		let mut nodes: BTreeMap<String, SafetyNodeSpec> = BTreeMap::new();
		nodes.insert("q0".to_owned(), SafetyNodeSpec { is_accepting: false });
		nodes.insert("q1".to_owned(), SafetyNodeSpec { is_accepting: true });

		let mut q0_edges: BTreeMap<String, EdgeSpec> = BTreeMap::new();
		q0_edges.insert("q1".to_owned(), EdgeSpec { symbols: vec!["a".to_owned()] });
		let mut edges: BTreeMap<String, BTreeMap<String, EdgeSpec>> = BTreeMap::new();
		edges.insert("q0".to_owned(), q0_edges);

		SafetyDfaSpec {
			alphabet_size: 2,
			num_states: 2,
			final_transition_sym: "$".to_owned(),
			empty_transition_sym: "epsilon".to_owned(),
			start_state: "q0".to_owned(),
			smooth_transitions: false,
			nodes,
			edges,
		}
	}

	#[test]
	fn rejects_undeclared_edge_endpoint() {
		let mut spec: SafetyDfaSpec = spec_with_two_states();
		let mut bad_edges: BTreeMap<String, EdgeSpec> = BTreeMap::new();
		bad_edges.insert("ghost".to_owned(), EdgeSpec { symbols: vec!["a".to_owned()] });
		spec.edges.insert("q1".to_owned(), bad_edges);
		assert!(SafetyDfa::from_spec(spec).is_err());
	}

	#[test]
	fn formula_fold_has_no_precedence() {
		let ops: BTreeMap<&'static str, fn(bool, bool) -> bool> = default_operators();
		// "a | b & c" folds strictly left to right: (a | b) & c.
		assert!(!satisfy_formula("a | b & c", "a", &BTreeSet::new(), &ops).unwrap());
		assert!(satisfy_formula("a | b & c", "c", &BTreeSet::new(), &ops).unwrap());
	}

	#[test]
	fn negated_atom_flips_the_match() {
		let ops: BTreeMap<&'static str, fn(bool, bool) -> bool> = default_operators();
		assert!(satisfy_formula("!a", "b", &BTreeSet::new(), &ops).unwrap());
		assert!(!satisfy_formula("!a", "a", &BTreeSet::new(), &ops).unwrap());
	}

	#[test]
	fn single_symbol_formula_has_no_operators() {
		let ops: BTreeMap<&'static str, fn(bool, bool) -> bool> = default_operators();
		assert!(satisfy_formula("a", "a", &BTreeSet::new(), &ops).unwrap());
		assert!(!satisfy_formula("a", "b", &BTreeSet::new(), &ops).unwrap());
	}
}
