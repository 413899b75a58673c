//! The merge engine (C3): destructive and speculative merges over the APTA,
//! the red/blue frontier, and the top-level search loop.
//!
//! Every speculative merge must be perfectly undoable. `merge`/`undo_merge`
//! cascade through determinized children in exactly opposite orders — see the
//! module note on `children`-map ordering in `apta`.
//!
//! When a safety DFA (C6) is loaded, every candidate merge is also filtered
//! through it: a cheap `pre_check_safety` veto at every node pair the cascade
//! visits, and a whole-graph `post_check_safety` recheck once a merge has
//! actually gone through.
use std::collections::BTreeSet;

use tracing::debug;
use tracing::trace;

use crate::apta::Apta;
use crate::apta::NodeId;
use crate::config::Config;
use crate::evaluator::EvalCtx;
use crate::evaluator::Evaluator;
use crate::evaluator::Payload;
use crate::safety::SafetyDfa;

pub struct Merger {
	apta: Apta,
	evaluator: Box<dyn Evaluator>,
	config: Config,
	safety: Option<SafetyDfa>,
	red_states: BTreeSet<NodeId>,
	blue_states: BTreeSet<NodeId>,
}

impl Merger {
	pub fn new(apta: Apta, evaluator: Box<dyn Evaluator>, config: Config, safety: Option<SafetyDfa>) -> Self {
		let mut merger: Self = Self { apta, evaluator, config, safety, red_states: BTreeSet::new(), blue_states: BTreeSet::new() };
		merger.reset();
		merger
	}

	pub fn apta(&self) -> &Apta {
		&self.apta
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn red_states(&self) -> &BTreeSet<NodeId> {
		&self.red_states
	}

	pub fn blue_states(&self) -> &BTreeSet<NodeId> {
		&self.blue_states
	}

	fn ctx(&self) -> EvalCtx<'_> {
		EvalCtx { apta: &self.apta, config: &self.config }
	}

	pub fn reset(&mut self) {
		self.red_states.clear();
		self.blue_states.clear();
		self.red_states.insert(self.apta.root());
		self.update();
	}

	fn consistent(&self, left: NodeId, right: NodeId) -> bool {
		self.evaluator.consistent(self.ctx(), left, right)
	}

	/// Cheap, local safety veto (C6): `true` when no safety DFA is loaded.
	fn safety_pre_consistent(&self, left: NodeId, right: NodeId) -> bool {
		self.safety.as_ref().map_or(true, |safety| safety.pre_check_safety(&self.apta, left, right))
	}

	/// Whole-graph safety recheck run once a merge has actually gone through;
	/// `true` when no safety DFA is loaded.
	fn safety_post_consistent(&self) -> bool {
		self.safety.as_ref().map_or(true, |safety| safety.post_check_safety(&self.apta))
	}

	fn update_score(&mut self, left: NodeId, right: NodeId) {
		let ctx: EvalCtx<'_> = EvalCtx { apta: &self.apta, config: &self.config };
		self.evaluator.update_score(ctx, left, right);
	}

	fn compute_consistency(&self, left: NodeId, right: NodeId) -> bool {
		self.evaluator.compute_consistency(self.ctx(), left, right)
	}

	fn compute_score(&self, left: NodeId, right: NodeId) -> i64 {
		self.evaluator.compute_score(self.ctx(), left, right)
	}

	fn reset_evaluator(&mut self) {
		self.evaluator.reset();
	}

	fn update_payload(&mut self, left: NodeId, right: NodeId) {
		let (left_node, right_node) = self.apta.node_pair_mut(left, right);
		self.evaluator.update(&mut left_node.data, &mut right_node.data);
	}

	fn undo_payload(&mut self, left: NodeId, right: NodeId) {
		let (left_node, right_node) = self.apta.node_pair_mut(left, right);
		self.evaluator.undo(&mut left_node.data, &mut right_node.data);
	}

	pub fn sink_type(&self, node: NodeId) -> i32 {
		self.evaluator.sink_type(self.ctx(), node)
	}

	fn sink_consistent(&self, node: NodeId, sink_type: i32) -> bool {
		self.evaluator.sink_consistent(self.ctx(), node, sink_type)
	}

	pub fn num_sink_types(&self) -> i32 {
		self.evaluator.num_sink_types(self.ctx())
	}

	pub fn evaluator_summary(&self, payload: &Payload) -> String {
		self.evaluator.payload_summary(payload)
	}

	/// The merged-view candidate frontier: every blue that is not itself a sink,
	/// expanded to its full merged-states subtree (mirrors `get_candidate_states`).
	pub fn candidate_states(&self) -> BTreeSet<NodeId> {
		let mut candidates: BTreeSet<NodeId> = BTreeSet::new();
		for &blue in &self.blue_states {
			if self.sink_type(blue) == -1 {
				candidates.extend(self.apta.get_merged_states(Some(blue)));
			}
		}
		candidates
	}

	/// The merged-view sink frontier: the complement of [`Merger::candidate_states`]
	/// within the blue states (mirrors `get_sink_states`).
	pub fn sink_states(&self) -> BTreeSet<NodeId> {
		let mut sinks: BTreeSet<NodeId> = BTreeSet::new();
		for &blue in &self.blue_states {
			if self.sink_type(blue) != -1 {
				sinks.extend(self.apta.get_merged_states(Some(blue)));
			}
		}
		sinks
	}

	/// Destructive merge of `right` into `left`: vetoes on inconsistency or a safety
	/// veto (returning `false` with the APTA untouched only at the top level — a
	/// caller that gets `false` back mid-cascade must call [`Merger::undo_merge`]
	/// itself), otherwise folds payload, installs the union-find pointer, and
	/// recurses over `right`'s children in ascending symbol order.
	pub fn merge(&mut self, left: NodeId, right: NodeId) -> bool {
		if !self.consistent(left, right) || !self.safety_pre_consistent(left, right) {
			return false;
		}

		if self.apta.node(left).red && self.config.red_fixed {
			let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
			for (symbol, right_child) in right_children {
				if !self.apta.node(left).children.contains_key(&symbol) && !self.sink_consistent(right_child, 0) {
					return false;
				}
			}
		}

		self.update_payload(left, right);
		self.update_score(left, right);
		self.apta.node_mut(right).representative = Some(left);
		let right_size: u32 = self.apta.node(right).size;
		self.apta.node_mut(left).size += right_size;

		let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
		for (symbol, right_child) in right_children {
			match self.apta.node(left).children.get(&symbol).copied() {
				None => {
					self.apta.node_mut(left).children.insert(symbol, right_child);
				}
				Some(existing) => {
					let child: NodeId = self.apta.find(existing);
					let other_child: NodeId = self.apta.find(right_child);
					if child != other_child {
						self.apta.node_mut(other_child).det_undo.insert(symbol, right);
						if !self.merge(child, other_child) {
							return false;
						}
					}
				}
			}
		}

		true
	}

	/// Unconditional variant of [`Merger::merge`]: no consistency checks, always
	/// commits. Used once a candidate has already survived [`Merger::testmerge`].
	pub fn merge_force(&mut self, left: NodeId, right: NodeId) {
		self.update_payload(left, right);
		self.apta.node_mut(right).representative = Some(left);
		let right_size: u32 = self.apta.node(right).size;
		self.apta.node_mut(left).size += right_size;

		let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
		for (symbol, right_child) in right_children {
			match self.apta.node(left).children.get(&symbol).copied() {
				None => {
					self.apta.node_mut(left).children.insert(symbol, right_child);
				}
				Some(existing) => {
					let child: NodeId = self.apta.find(existing);
					let other_child: NodeId = self.apta.find(right_child);
					if child != other_child {
						self.apta.node_mut(other_child).det_undo.insert(symbol, right);
						self.merge_force(child, other_child);
					}
				}
			}
		}
	}

	/// Non-destructive consistency probe: checks and scores without mutating
	/// payload or installing the union-find pointer, recursing only into
	/// children both sides already determinize to.
	pub fn merge_test(&mut self, left: NodeId, right: NodeId) -> bool {
		if !self.consistent(left, right) || !self.safety_pre_consistent(left, right) {
			return false;
		}

		if self.apta.node(left).red && self.config.red_fixed {
			let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
			for (symbol, right_child) in right_children {
				if !self.apta.node(left).children.contains_key(&symbol) && !self.sink_consistent(right_child, 0) {
					return false;
				}
			}
		}

		self.update_score(left, right);

		let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
		for (symbol, right_child) in right_children {
			if let Some(existing) = self.apta.node(left).children.get(&symbol).copied() {
				let child: NodeId = self.apta.find(existing);
				let other_child: NodeId = self.apta.find(right_child);
				if child != other_child && !self.merge_test(child, other_child) {
					return false;
				}
			}
		}

		true
	}

	/// Exactly reverses a prior [`Merger::merge`]/[`Merger::merge_force`] pair.
	/// Cascades over `right`'s children in descending symbol order — the mirror
	/// image of the forward cascade.
	pub fn undo_merge(&mut self, left: NodeId, right: NodeId) {
		if self.apta.node(right).representative != Some(left) {
			return;
		}

		let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().rev().map(|(&s, &c)| (s, c)).collect();
		for (symbol, right_child) in right_children {
			match self.apta.node(left).children.get(&symbol).copied() {
				Some(existing) if existing == right_child => {
					self.apta.node_mut(left).children.remove(&symbol);
				}
				Some(_) => {
					// The direct child was cascaded away by a nested merge; walk right_child's
					// representative chain to the node that actually carries this cascade's marker.
					let marked: NodeId = self
						.apta
						.find_until(right_child, right, symbol)
						.expect("a cascaded conflict must leave a det_undo marker for its ancestor");
					let nested_left: NodeId = self.apta.node(marked).representative.expect("marked node was merged during the cascade");
					self.undo_merge(nested_left, marked);
					self.apta.node_mut(marked).det_undo.remove(&symbol);
				}
				None => {}
			}
		}

		self.undo_payload(left, right);
		let right_size: u32 = self.apta.node(right).size;
		self.apta.node_mut(left).size -= right_size;
		self.apta.node_mut(right).representative = None;
	}

	/// Rebuilds the red/blue frontier after the class structure has changed:
	/// every red's representative becomes the new red set, and every symbol on
	/// which a red has an outgoing, not-yet-red child adds that child to blue.
	pub fn update(&mut self) {
		let mut new_red: BTreeSet<NodeId> = BTreeSet::new();
		for &red in &self.red_states {
			let resolved: NodeId = self.apta.find(red);
			new_red.insert(resolved);
			self.apta.node_mut(resolved).red = true;
		}

		let mut new_blue: BTreeSet<NodeId> = BTreeSet::new();
		let alphabet_size: u32 = self.apta.alphabet_size();
		for &red in &new_red {
			for symbol in 0..alphabet_size {
				if let Some(child) = self.apta.get_child(red, symbol) {
					if !new_red.contains(&child) {
						new_blue.insert(child);
					}
				}
			}
		}

		self.red_states = new_red;
		self.blue_states = new_blue;
		let ctx: EvalCtx<'_> = EvalCtx { apta: &self.apta, config: &self.config };
		self.evaluator.update_after_commit(ctx);
	}

	/// Tries every red as a merge partner for each non-sink blue, promoting the
	/// first blue with no consistent partner into red. Returns `true` once a
	/// promotion happens (the caller re-evaluates the now-changed frontier).
	pub fn extend_red(&mut self) -> bool {
		let blues: Vec<NodeId> = self.blue_states.iter().copied().collect();
		for blue in blues {
			if !self.config.merge_sinks_dsolve && self.sink_type(blue) != -1 {
				continue;
			}

			let reds: Vec<NodeId> = self.red_states.iter().copied().collect();
			let mut found: bool = false;
			for red in reds {
				if self.testmerge(red, blue) != -1 {
					found = true;
				}
			}

			if !found {
				self.blue_states.remove(&blue);
				self.red_states.insert(blue);
				self.apta.node_mut(blue).red = true;

				let alphabet_size: u32 = self.apta.alphabet_size();
				for symbol in 0..alphabet_size {
					if let Some(child) = self.apta.get_child(blue, symbol) {
						self.blue_states.insert(child);
					}
				}
				return true;
			}
		}
		false
	}

	/// Commits a candidate merge unconditionally (the caller already scored it
	/// via [`Merger::testmerge`]) and refreshes the frontier.
	pub fn perform_merge(&mut self, left: NodeId, right: NodeId) -> bool {
		let left_root: NodeId = self.apta.find(left);
		let right_root: NodeId = self.apta.find(right);
		self.merge_force(left_root, right_root);
		self.update();
		true
	}

	/// Scores a candidate merge without committing: resets the evaluator,
	/// speculatively merges (destructively if `merge_when_testing`, else via the
	/// cheaper `merge_test`), checks consistency and the whole-graph safety
	/// recheck, and always undoes destructive speculation before returning.
	/// `-1` means the merge is rejected.
	pub fn testmerge(&mut self, left: NodeId, right: NodeId) -> i64 {
		self.reset_evaluator();
		let mut result: i64 = -1;

		if self.evaluator.compute_before_merge() {
			result = self.compute_score(left, right);
		}

		let merge_result: bool = if self.config.merge_when_testing { self.merge(left, right) } else { self.merge_test(left, right) };

		if merge_result && !self.evaluator.compute_before_merge() {
			result = self.compute_score(left, right);
		}

		if (merge_result && (!self.compute_consistency(left, right) || !self.safety_post_consistent())) || result < self.config.lower_bound {
			result = -1;
		}

		if self.config.merge_when_testing {
			self.undo_merge(left, right);
		}

		if !merge_result { -1 } else { result }
	}

	/// Cheap, single-pair (non-recursive) variant of [`Merger::testmerge`], used
	/// where only the immediate pair's consistency/score matters.
	pub fn test_local_merge(&mut self, left: NodeId, right: NodeId) -> i64 {
		self.reset_evaluator();
		if !self.consistent(left, right) || !self.safety_pre_consistent(left, right) {
			return -1;
		}

		if self.apta.node(left).red && self.config.red_fixed {
			let right_children: Vec<(u32, NodeId)> = self.apta.node(right).children.iter().map(|(&s, &c)| (s, c)).collect();
			for (symbol, right_child) in right_children {
				if !self.apta.node(left).children.contains_key(&symbol) && !self.sink_consistent(right_child, 0) {
					return -1;
				}
			}
		}

		if !self.evaluator.compute_before_merge() {
			self.update_score(left, right);
		}
		self.compute_score(left, right)
	}

	/// Every scored `(red, blue)` (and, if `merge_blue_blue`, `(blue, blue)`)
	/// candidate, ascending by score; ties keep discovery order (§5).
	pub fn get_possible_merges(&mut self) -> Vec<(i64, (NodeId, NodeId))> {
		self.reset_evaluator();
		let mut candidates: Vec<(i64, (NodeId, NodeId))> = Vec::new();

		let blues: Vec<NodeId> = self.blue_states.iter().copied().collect();
		for blue in blues {
			if !self.config.merge_sinks_dsolve && self.sink_type(blue) != -1 {
				continue;
			}

			let reds: Vec<NodeId> = self.red_states.iter().copied().collect();
			for red in reds {
				let score: i64 = self.testmerge(red, blue);
				if score > -1 {
					candidates.push((score, (red, blue)));
				}
			}

			if self.config.merge_blue_blue {
				let blues2: Vec<NodeId> = self.blue_states.iter().copied().collect();
				for blue2 in blues2 {
					if blue2 == blue {
						continue;
					}
					let score: i64 = self.testmerge(blue2, blue);
					if score > -1 {
						candidates.push((score, (blue2, blue)));
					}
				}
			}

			if self.config.merge_most_visited {
				break;
			}
		}

		candidates.sort_by_key(|&(score, _)| score);
		candidates
	}

	/// One iteration of the top-level search: commits the highest-scoring
	/// candidate merge if one exists, otherwise promotes a blue with no
	/// consistent partner to red. Returns `false` once neither is possible
	/// (fixpoint reached).
	pub fn step(&mut self) -> bool {
		if self.blue_states.is_empty() {
			return false;
		}

		let mut candidates: Vec<(i64, (NodeId, NodeId))> = self.get_possible_merges();
		if let Some((score, (left, right))) = candidates.pop() {
			trace!(score, ?left, ?right, "committing best scoring merge");
			self.perform_merge(left, right);
			return true;
		}

		if self.extend_red() {
			return true;
		}

		false
	}

	/// Runs [`Merger::step`] to a fixpoint: every blue state either merged away
	/// or promoted to red.
	pub fn run(&mut self) {
		debug!(blue = self.blue_states.len(), red = self.red_states.len(), "starting merge search");
		while self.step() {}
		debug!(red = self.red_states.len(), "merge search converged");
	}

	pub fn safety(&self) -> Option<&SafetyDfa> {
		self.safety.as_ref()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::evaluator::Payload;
	use crate::evaluators::state_driven::StateDrivenEvaluator;
	use crate::evaluators::state_driven::StateDrivenPayload;

	fn fresh_merger() -> Merger {
		let apta: Apta = Apta::new(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()], Payload::StateDriven(StateDrivenPayload::default()));
		Merger::new(apta, Box::new(StateDrivenEvaluator::new()), Config::default(), None)
	}

	fn leaf(apta: &mut Apta, parent: NodeId, symbol: u32) -> NodeId {
		apta.get_or_insert_child(parent, symbol, 1, Payload::StateDriven(StateDrivenPayload::default()))
	}

	#[test]
	fn reset_makes_root_the_only_red_state() {
		let merger: Merger = fresh_merger();
		assert_eq!(merger.red_states().len(), 1);
		assert!(merger.red_states().contains(&merger.apta().root()));
		assert!(merger.blue_states().is_empty());
	}

	#[test]
	fn merge_then_undo_restores_apta_shape() {
		let mut merger: Merger = fresh_merger();
		let root: NodeId = merger.apta().root();
		let left: NodeId;
		let right: NodeId;
		{
			let apta = &mut merger.apta;
			// Two leaves reached via the same symbol from distinct parents, so their
			// `label` (the incoming transition's symbol) matches and `consistent` passes.
			let parent_left: NodeId = leaf(apta, root, 0);
			let parent_right: NodeId = leaf(apta, root, 1);
			left = leaf(apta, parent_left, 0);
			right = leaf(apta, parent_right, 0);
		}
		let before_len: usize = merger.apta().len();
		assert!(merger.merge(left, right));
		assert_eq!(merger.apta().find(right), left);
		merger.undo_merge(left, right);
		assert_eq!(merger.apta().find(right), right);
		assert_eq!(merger.apta().len(), before_len);
	}

	/// Regression test for a bug where `undo_merge` read `right_child.representative`
	/// directly instead of routing through `Apta::find_until`: when `right_child` was
	/// already merged away by an earlier, unrelated commit before the cascade being
	/// undone even ran, the direct read picks up that unrelated merge's pointer and
	/// `undo_merge` dismantles the wrong one.
	#[test]
	fn undo_merge_through_prior_unrelated_merge_targets_the_right_cascade() {
		let mut merger: Merger = fresh_merger();
		let root: NodeId = merger.apta().root();
		let (left0, right0, left_child, right_child, stray): (NodeId, NodeId, NodeId, NodeId, NodeId);
		{
			let apta = &mut merger.apta;
			let branch_a: NodeId = leaf(apta, root, 0);
			let branch_b: NodeId = leaf(apta, root, 1);
			let branch_c: NodeId = leaf(apta, root, 2);
			left0 = leaf(apta, branch_a, 0);
			right0 = leaf(apta, branch_b, 0);
			left_child = leaf(apta, left0, 1);
			right_child = leaf(apta, right0, 1);
			stray = leaf(apta, branch_c, 1);
		}

		// An unrelated merge, committed before the cascade under test, already
		// points `right_child` at `stray`.
		assert!(merger.merge(stray, right_child));

		// This cascades on symbol 1: `right0`'s child (`right_child`) resolves
		// through the prior merge to `stray`, so the nested merge is actually
		// `merge(left_child, stray)`, recorded via `det_undo` keyed on `right0`.
		assert!(merger.merge(left0, right0));
		assert_eq!(merger.apta().find(stray), left_child);

		merger.undo_merge(left0, right0);

		assert_eq!(merger.apta().find(right0), right0);
		assert_eq!(merger.apta().find(left_child), left_child);
		// The nested cascade merge is undone...
		assert_eq!(merger.apta().find(stray), stray);
		// ...while the unrelated, earlier commit is left untouched.
		assert_eq!(merger.apta().find(right_child), stray);
	}

	#[test]
	fn run_converges_with_no_blue_states_left() {
		let mut merger: Merger = fresh_merger();
		let root: NodeId = merger.apta().root();
		{
			let apta = &mut merger.apta;
			apta.get_or_insert_child(root, 0, 1, Payload::StateDriven(StateDrivenPayload::default()));
		}
		merger.update();
		merger.run();
		assert!(merger.blue_states().is_empty());
	}
}
