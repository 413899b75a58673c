//! Process-wide configuration surface (C12): the flags in `SPEC_FULL.md` §5/§6,
//! collected into one immutable, `Copy` value threaded by value into `Merger::new`.
use crate::registry::HeuristicId;

/// Every tunable flag the merge engine and evaluators read. Built once (from
/// CLI arguments or `Default`) and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
	pub heuristic: HeuristicId,
	pub state_count: u64,
	pub symbol_count: u64,
	pub correction: f64,
	pub check_parameter: f64,
	pub use_sinks: bool,
	pub lower_bound: i64,
	pub red_fixed: bool,
	pub merge_sinks_dsolve: bool,
	pub merge_when_testing: bool,
	pub merge_blue_blue: bool,
	pub merge_most_visited: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			heuristic: HeuristicId::CountDriven,
			state_count: 1,
			symbol_count: 1,
			correction: 0.0,
			check_parameter: 0.0,
			use_sinks: false,
			lower_bound: 0,
			red_fixed: false,
			merge_sinks_dsolve: false,
			merge_when_testing: false,
			merge_blue_blue: false,
			merge_most_visited: false,
		}
	}
}

/// Accumulates overrides atop `Config::default()`; used by the CLI (C13) and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBuilder {
	config: Config,
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self { config: Config::default() }
	}

	pub fn heuristic(mut self, heuristic: HeuristicId) -> Self {
		self.config.heuristic = heuristic;
		self
	}

	pub fn state_count(mut self, state_count: u64) -> Self {
		self.config.state_count = state_count;
		self
	}

	pub fn symbol_count(mut self, symbol_count: u64) -> Self {
		self.config.symbol_count = symbol_count;
		self
	}

	pub fn correction(mut self, correction: f64) -> Self {
		self.config.correction = correction;
		self
	}

	pub fn check_parameter(mut self, check_parameter: f64) -> Self {
		self.config.check_parameter = check_parameter;
		self
	}

	pub fn use_sinks(mut self, use_sinks: bool) -> Self {
		self.config.use_sinks = use_sinks;
		self
	}

	pub fn lower_bound(mut self, lower_bound: i64) -> Self {
		self.config.lower_bound = lower_bound;
		self
	}

	pub fn red_fixed(mut self, red_fixed: bool) -> Self {
		self.config.red_fixed = red_fixed;
		self
	}

	pub fn merge_sinks_dsolve(mut self, merge_sinks_dsolve: bool) -> Self {
		self.config.merge_sinks_dsolve = merge_sinks_dsolve;
		self
	}

	pub fn merge_when_testing(mut self, merge_when_testing: bool) -> Self {
		self.config.merge_when_testing = merge_when_testing;
		self
	}

	pub fn merge_blue_blue(mut self, merge_blue_blue: bool) -> Self {
		self.config.merge_blue_blue = merge_blue_blue;
		self
	}

	pub fn merge_most_visited(mut self, merge_most_visited: bool) -> Self {
		self.config.merge_most_visited = merge_most_visited;
		self
	}

	pub fn build(self) -> Config {
		self.config
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_matches_out_of_box_behavior() {
		let config: Config = Config::default();
		assert_eq!(config.heuristic, HeuristicId::CountDriven);
		assert!(!config.use_sinks);
	}

	#[test]
	fn builder_overrides_only_named_fields() {
		let config: Config = ConfigBuilder::new().use_sinks(true).lower_bound(5).build();
		assert!(config.use_sinks);
		assert_eq!(config.lower_bound, 5);
		assert_eq!(config.state_count, Config::default().state_count);
	}
}
