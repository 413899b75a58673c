//! The pluggable evaluator contract (consistency, score, sink classification)
//! and the payload capability pair each concrete evaluator owns.
use crate::apta::Apta;
use crate::apta::NodeId;
use crate::config::Config;
use crate::evaluators::mse::MsePayload;
use crate::evaluators::state_driven::StateDrivenPayload;

/// Evaluator-owned per-node data. The discriminant is fixed by whichever
/// evaluator built the APTA and never changes afterwards.
#[derive(Debug, Clone)]
pub enum Payload {
	StateDriven(StateDrivenPayload),
	Mse(MsePayload),
}

impl Payload {
	pub fn as_state_driven(&self) -> &StateDrivenPayload {
		match self {
			Self::StateDriven(payload) => payload,
			Self::Mse(_) => panic!("payload is not state-driven"),
		}
	}

	pub fn as_state_driven_mut(&mut self) -> &mut StateDrivenPayload {
		match self {
			Self::StateDriven(payload) => payload,
			Self::Mse(_) => panic!("payload is not state-driven"),
		}
	}

	pub fn as_mse(&self) -> &MsePayload {
		match self {
			Self::Mse(payload) => payload,
			Self::StateDriven(_) => panic!("payload is not mse"),
		}
	}

	pub fn as_mse_mut(&mut self) -> &mut MsePayload {
		match self {
			Self::Mse(payload) => payload,
			Self::StateDriven(_) => panic!("payload is not mse"),
		}
	}
}

/// Read-only access to the two pieces of process-wide state an evaluator needs:
/// the APTA it is scoring over, and the immutable configuration flags.
/// Threaded explicitly rather than via `&Merger` so that `Merger` can borrow its
/// `apta`/`config`/`evaluator` fields disjointly when calling into the trait.
#[derive(Clone, Copy)]
pub struct EvalCtx<'a> {
	pub apta: &'a Apta,
	pub config: &'a Config,
}

/// Ingestion hooks, consistency/score computation, and sink classification for
/// one heuristic. All payload mutation happens through `update`/`undo`, which
/// must be exact inverses of one another (Property 1, `SPEC_FULL.md` §10).
pub trait Evaluator: std::fmt::Debug {
	/// If `true`, `compute_score` is evaluated before the merge cascade and
	/// `update_score` is not called during it; if `false`, the reverse.
	fn compute_before_merge(&self) -> bool;

	fn new_payload(&self) -> Payload;

	/// A trace leaves this node on `symbol`.
	fn read_from(&self, payload: &mut Payload, trace_type: i32, index: usize, length: usize, symbol: u32, data: &str);

	/// A trace arrives at this node on `symbol`; final position iff `length == index + 1`.
	fn read_to(&self, payload: &mut Payload, trace_type: i32, index: usize, length: usize, symbol: u32, data: &str);

	/// Merges `other` into `target`, possibly draining data out of `other`;
	/// must record whatever `undo` needs to reverse this exactly.
	fn update(&self, target: &mut Payload, other: &mut Payload);

	/// Exactly reverses a prior `update(target, other)`.
	fn undo(&self, target: &mut Payload, other: &mut Payload);

	/// Cheap pre-merge local check.
	fn consistent(&self, ctx: EvalCtx, left: NodeId, right: NodeId) -> bool;

	/// Called for every node pair visited during a merge cascade; accumulates score state.
	fn update_score(&mut self, ctx: EvalCtx, left: NodeId, right: NodeId);

	/// Post-/during-merge check exploiting the determinized view.
	fn compute_consistency(&self, ctx: EvalCtx, left: NodeId, right: NodeId) -> bool;

	/// Yields the merge score; callers veto the merge when it is below `Config::lower_bound`.
	fn compute_score(&self, ctx: EvalCtx, left: NodeId, right: NodeId) -> i64;

	/// Zeroes accumulators; called before every speculative merge evaluation.
	fn reset(&mut self);

	/// Called once, after a merge has been committed (not during speculative testing).
	fn update_after_commit(&mut self, ctx: EvalCtx) {
		let _ = ctx;
	}

	fn sink_type(&self, ctx: EvalCtx, node: NodeId) -> i32;
	fn sink_consistent(&self, ctx: EvalCtx, node: NodeId, sink_type: i32) -> bool;
	fn num_sink_types(&self, ctx: EvalCtx) -> i32;

	/// Short label for this node's payload, used by the DOT writer.
	fn payload_summary(&self, payload: &Payload) -> String;
}
