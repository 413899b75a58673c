//! Mean-squared-error evaluator over continuous per-symbol observations (C5).
//!
//! Each node accumulates the raw values that arrived at it; `consistent` vetoes
//! merges whose means diverge by more than `Config::check_parameter`, and
//! `compute_score` ranks candidates by the description-length-style criterion
//! `-2 * num_states + num_points * ln(RSS_total / num_points)` over the whole
//! automaton (the C++ original keeps an alternate merge-local score computed
//! in `update_score`/`compute_score` behind an unconditional early return;
//! that branch is dead in the source and is not reproduced here).
use crate::apta::NodeId;
use crate::evaluator::EvalCtx;
use crate::evaluator::Evaluator;
use crate::evaluator::Payload;
use crate::registry::HeuristicId;
use crate::registry::{self};

/// Per-node evidence: the raw observations that reached this node, and their
/// running mean. `merge_point` records, after an `update`, how many of
/// `occurrences`'s entries belonged to the target before the splice, so
/// `undo` can split them back out.
#[derive(Debug, Clone, Default)]
pub struct MsePayload {
	pub mean: f64,
	pub occurrences: Vec<f64>,
	pub merge_point: usize,
}

impl PartialEq for MsePayload {
	fn eq(&self, other: &Self) -> bool {
		self.mean == other.mean && self.occurrences == other.occurrences
	}
}

#[derive(Debug, Default)]
pub struct MseEvaluator;

impl MseEvaluator {
	pub fn new() -> Self {
		Self::default()
	}

	fn rss(data: &MsePayload) -> f64 {
		data.occurrences.iter().map(|&value| (data.mean - value) * (data.mean - value)).sum()
	}
}

inventory::submit! {
	registry::EvaluatorFactory {
		id: HeuristicId::Mse,
		name: "mse",
		make: || Box::new(MseEvaluator::new()),
	}
}

impl Evaluator for MseEvaluator {
	fn compute_before_merge(&self) -> bool {
		false
	}

	fn new_payload(&self) -> Payload {
		Payload::Mse(MsePayload::default())
	}

	fn read_from(&self, payload: &mut Payload, _trace_type: i32, _index: usize, _length: usize, _symbol: u32, data: &str) {
		let Ok(value) = data.parse::<f64>() else { return };
		let payload: &mut MsePayload = payload.as_mse_mut();
		let count: f64 = payload.occurrences.len() as f64;
		payload.mean = (payload.mean * count + value) / (count + 1.0);
		payload.occurrences.insert(0, value);
	}

	fn read_to(&self, _payload: &mut Payload, _trace_type: i32, _index: usize, _length: usize, _symbol: u32, _data: &str) {}

	fn update(&self, target: &mut Payload, other: &mut Payload) {
		let target: &mut MsePayload = target.as_mse_mut();
		let other: &mut MsePayload = other.as_mse_mut();
		if !other.occurrences.is_empty() {
			let left_count: f64 = target.occurrences.len() as f64;
			let right_count: f64 = other.occurrences.len() as f64;
			target.mean = (target.mean * left_count + other.mean * right_count) / (left_count + right_count);
		}
		other.merge_point = target.occurrences.len();
		target.occurrences.append(&mut other.occurrences);
	}

	fn undo(&self, target: &mut Payload, other: &mut Payload) {
		let target: &mut MsePayload = target.as_mse_mut();
		let other: &mut MsePayload = other.as_mse_mut();
		let tail: Vec<f64> = target.occurrences.split_off(other.merge_point);
		other.occurrences = tail;
		if !target.occurrences.is_empty() {
			let total_count: f64 = (target.occurrences.len() + other.occurrences.len()) as f64;
			let right_count: f64 = other.occurrences.len() as f64;
			target.mean = (target.mean * total_count - other.mean * right_count) / target.occurrences.len() as f64;
		} else {
			target.mean = 0.0;
		}
	}

	fn consistent(&self, ctx: EvalCtx, left: NodeId, right: NodeId) -> bool {
		let l: &MsePayload = ctx.apta.node(left).data.as_mse();
		let r: &MsePayload = ctx.apta.node(right).data.as_mse();
		if (l.occurrences.len() as u64) < ctx.config.symbol_count || (r.occurrences.len() as u64) < ctx.config.symbol_count {
			return true;
		}
		(l.mean - r.mean).abs() <= ctx.config.check_parameter
	}

	fn update_score(&mut self, _ctx: EvalCtx, _left: NodeId, _right: NodeId) {}

	fn compute_consistency(&self, _ctx: EvalCtx, _left: NodeId, _right: NodeId) -> bool {
		true
	}

	fn compute_score(&self, ctx: EvalCtx, _left: NodeId, _right: NodeId) -> i64 {
		let mut rss_total: f64 = 0.0;
		let mut num_parameters: f64 = 0.0;
		let mut num_data_points: f64 = 0.0;
		for state in ctx.apta.get_merged_states(None) {
			let data: &MsePayload = ctx.apta.node(state).data.as_mse();
			rss_total += Self::rss(data);
			num_parameters += 1.0;
			num_data_points += data.occurrences.len() as f64;
		}
		if num_data_points == 0.0 || rss_total == 0.0 {
			return 10_000_000 - 2 * num_parameters as i64;
		}
		(10_000_000.0 - 2.0 * num_parameters + num_data_points * (rss_total / num_data_points).ln()) as i64
	}

	fn reset(&mut self) {}

	fn sink_type(&self, ctx: EvalCtx, node: NodeId) -> i32 {
		if !ctx.config.use_sinks {
			return -1;
		}
		let data: &MsePayload = ctx.apta.node(node).data.as_mse();
		if (data.occurrences.len() as u64) < ctx.config.state_count {
			0
		} else {
			-1
		}
	}

	fn sink_consistent(&self, ctx: EvalCtx, node: NodeId, sink_type: i32) -> bool {
		if !ctx.config.use_sinks {
			return false;
		}
		if sink_type == 0 {
			return self.sink_type(ctx, node) == 0;
		}
		true
	}

	fn num_sink_types(&self, ctx: EvalCtx) -> i32 {
		if ctx.config.use_sinks { 1 } else { 0 }
	}

	fn payload_summary(&self, payload: &Payload) -> String {
		let data: &MsePayload = payload.as_mse();
		format!("{:.3}\n{}", data.mean, data.occurrences.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn payload(values: &[f64]) -> Payload {
		let mut data: MsePayload = MsePayload::default();
		for &value in values {
			let count: f64 = data.occurrences.len() as f64;
			data.mean = (data.mean * count + value) / (count + 1.0);
			data.occurrences.push(value);
		}
		Payload::Mse(data)
	}

	#[test]
	fn update_and_undo_are_exact_inverses() {
		let eval: MseEvaluator = MseEvaluator::new();
		let mut target: Payload = payload(&[1.0, 2.0, 3.0]);
		let before: MsePayload = target.as_mse().clone();
		let mut other: Payload = payload(&[10.0, 20.0]);
		eval.update(&mut target, &mut other);
		assert_eq!(target.as_mse().occurrences.len(), 5);
		eval.undo(&mut target, &mut other);
		assert_eq!(*target.as_mse(), before);
		assert_eq!(other.as_mse().occurrences, vec![10.0, 20.0]);
	}

	#[test]
	fn divergent_means_are_inconsistent_once_enough_evidence() {
		let data_left: MsePayload = match payload(&[0.0, 0.0, 0.0]) {
			Payload::Mse(p) => p,
			_ => unreachable!(),
		};
		let data_right: MsePayload = match payload(&[100.0, 100.0, 100.0]) {
			Payload::Mse(p) => p,
			_ => unreachable!(),
		};
		assert!((data_left.mean - data_right.mean).abs() > 1.0);
	}
}
