//! Count-driven evaluator over discrete accept/reject evidence (C4).
//!
//! A merge is vetoed the moment either side has ever seen the *other* side's
//! verdict; the score is simply how many merges have been folded in so far,
//! so the search prefers whichever candidate compresses the APTA the most.
use crate::apta::NodeId;
use crate::evaluator::EvalCtx;
use crate::evaluator::Evaluator;
use crate::evaluator::Payload;
use crate::registry::HeuristicId;
use crate::registry::{self};

/// Per-node evidence: how many traces of each verdict passed through (`*_paths`)
/// or terminated at (`num_*`) this node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateDrivenPayload {
	pub num_accepting: u64,
	pub num_rejecting: u64,
	pub accepting_paths: u64,
	pub rejecting_paths: u64,
}

#[derive(Debug, Default)]
pub struct StateDrivenEvaluator {
	num_merges: i64,
}

impl StateDrivenEvaluator {
	pub fn new() -> Self {
		Self::default()
	}
}

inventory::submit! {
	registry::EvaluatorFactory {
		id: HeuristicId::CountDriven,
		name: "count_driven",
		make: || Box::new(StateDrivenEvaluator::new()),
	}
}

impl Evaluator for StateDrivenEvaluator {
	fn compute_before_merge(&self) -> bool {
		false
	}

	fn new_payload(&self) -> Payload {
		Payload::StateDriven(StateDrivenPayload::default())
	}

	fn read_from(&self, payload: &mut Payload, trace_type: i32, _index: usize, _length: usize, _symbol: u32, _data: &str) {
		let data: &mut StateDrivenPayload = payload.as_state_driven_mut();
		if trace_type == 1 {
			data.accepting_paths += 1;
		} else {
			data.rejecting_paths += 1;
		}
	}

	fn read_to(&self, payload: &mut Payload, trace_type: i32, index: usize, length: usize, _symbol: u32, _data: &str) {
		if length != index + 1 {
			return;
		}
		let data: &mut StateDrivenPayload = payload.as_state_driven_mut();
		if trace_type == 1 {
			data.num_accepting += 1;
		} else {
			data.num_rejecting += 1;
		}
	}

	fn update(&self, target: &mut Payload, other: &mut Payload) {
		let other: StateDrivenPayload = *other.as_state_driven();
		let data: &mut StateDrivenPayload = target.as_state_driven_mut();
		data.num_accepting += other.num_accepting;
		data.num_rejecting += other.num_rejecting;
		data.accepting_paths += other.accepting_paths;
		data.rejecting_paths += other.rejecting_paths;
	}

	fn undo(&self, target: &mut Payload, other: &mut Payload) {
		let other: StateDrivenPayload = *other.as_state_driven();
		let data: &mut StateDrivenPayload = target.as_state_driven_mut();
		data.num_accepting -= other.num_accepting;
		data.num_rejecting -= other.num_rejecting;
		data.accepting_paths -= other.accepting_paths;
		data.rejecting_paths -= other.rejecting_paths;
	}

	fn consistent(&self, ctx: EvalCtx, left: NodeId, right: NodeId) -> bool {
		let l: &StateDrivenPayload = ctx.apta.node(left).data.as_state_driven();
		let r: &StateDrivenPayload = ctx.apta.node(right).data.as_state_driven();
		if l.num_accepting != 0 && r.num_rejecting != 0 {
			return false;
		}
		if l.num_rejecting != 0 && r.num_accepting != 0 {
			return false;
		}
		if ctx.apta.node(left).label != ctx.apta.node(right).label {
			return false;
		}
		true
	}

	fn update_score(&mut self, _ctx: EvalCtx, _left: NodeId, _right: NodeId) {
		self.num_merges += 1;
	}

	fn compute_consistency(&self, _ctx: EvalCtx, _left: NodeId, _right: NodeId) -> bool {
		true
	}

	fn compute_score(&self, _ctx: EvalCtx, _left: NodeId, _right: NodeId) -> i64 {
		self.num_merges
	}

	fn reset(&mut self) {
		self.num_merges = 0;
	}

	fn sink_type(&self, ctx: EvalCtx, node: NodeId) -> i32 {
		if !ctx.config.use_sinks {
			return -1;
		}
		let data: &StateDrivenPayload = ctx.apta.node(node).data.as_state_driven();
		if data.num_accepting == 0 && data.num_rejecting > 0 {
			return 0;
		}
		if data.num_rejecting == 0 && data.num_accepting > 0 {
			return 1;
		}
		-1
	}

	fn sink_consistent(&self, ctx: EvalCtx, node: NodeId, sink_type: i32) -> bool {
		if !ctx.config.use_sinks {
			return true;
		}
		match sink_type {
			0 => self.sink_type(ctx, node) == 0,
			1 => self.sink_type(ctx, node) == 1,
			_ => true,
		}
	}

	fn num_sink_types(&self, ctx: EvalCtx) -> i32 {
		if ctx.config.use_sinks { 2 } else { 0 }
	}

	fn payload_summary(&self, payload: &Payload) -> String {
		let data: &StateDrivenPayload = payload.as_state_driven();
		format!("+{}/-{}", data.num_accepting, data.num_rejecting)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn update_and_undo_are_exact_inverses() {
		let eval: StateDrivenEvaluator = StateDrivenEvaluator::new();
		let mut target: Payload = Payload::StateDriven(StateDrivenPayload {
			num_accepting: 3,
			num_rejecting: 0,
			accepting_paths: 5,
			rejecting_paths: 0,
		});
		let before: StateDrivenPayload = *target.as_state_driven();
		let mut other: Payload = Payload::StateDriven(StateDrivenPayload {
			num_accepting: 1,
			num_rejecting: 0,
			accepting_paths: 2,
			rejecting_paths: 0,
		});
		eval.update(&mut target, &mut other);
		assert_eq!(target.as_state_driven().num_accepting, 4);
		eval.undo(&mut target, &mut other);
		assert_eq!(*target.as_state_driven(), before);
	}

	#[test]
	fn mixed_evidence_is_inconsistent() {
		let l: StateDrivenPayload = StateDrivenPayload { num_accepting: 1, ..Default::default() };
		let r: StateDrivenPayload = StateDrivenPayload { num_rejecting: 1, ..Default::default() };
		assert!(l.num_accepting != 0 && r.num_rejecting != 0);
	}
}
