//! Process-wide `name -> evaluator factory` map (C8), populated via `inventory`
//! at process start by each evaluator module's `inventory::submit!` block.
use crate::evaluator::Evaluator;

/// Mirrors the original tool's `HEURISTIC` enum (EDSM=1, OVERLAP=2,
/// COUNT_DRIVEN=3, LIKELIHOODRATIO=4, AIC=5, KULLBACKLEIBLER=6), plus `Mse`
/// for the continuous-observation evaluator this core adds (see `DESIGN.md`).
/// Only `CountDriven` and `Mse` have a registered factory; selecting any other
/// variant is a config-time error (§7, `SPEC_FULL.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicId {
	Edsm,
	Overlap,
	CountDriven,
	LikelihoodRatio,
	Aic,
	KullbackLeibler,
	Mse,
}

impl HeuristicId {
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"edsm" => Some(Self::Edsm),
			"overlap" => Some(Self::Overlap),
			"count_driven" => Some(Self::CountDriven),
			"likelihoodratio" => Some(Self::LikelihoodRatio),
			"aic" => Some(Self::Aic),
			"kullbackleibler" => Some(Self::KullbackLeibler),
			"mse" => Some(Self::Mse),
			_ => None,
		}
	}
}

/// One evaluator's self-registration: its id/name and a zero-argument constructor.
pub struct EvaluatorFactory {
	pub id: HeuristicId,
	pub name: &'static str,
	pub make: fn() -> Box<dyn Evaluator>,
}

inventory::collect!(EvaluatorFactory);

/// Errors building an evaluator from a name or id unknown to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHeuristic {
	pub requested: String,
}

/// Looks up a factory by heuristic name (case-sensitive, matches `EvaluatorFactory::name`).
pub fn make_by_name(name: &str) -> Result<Box<dyn Evaluator>, UnknownHeuristic> {
	inventory::iter::<EvaluatorFactory>()
		.find(|factory| factory.name == name)
		.map(|factory| (factory.make)())
		.ok_or_else(|| UnknownHeuristic { requested: name.to_owned() })
}

/// Looks up a factory by heuristic id.
pub fn make_by_id(id: HeuristicId) -> Result<Box<dyn Evaluator>, UnknownHeuristic> {
	inventory::iter::<EvaluatorFactory>()
		.find(|factory| factory.id == id)
		.map(|factory| (factory.make)())
		.ok_or_else(|| UnknownHeuristic { requested: format!("{id:?}") })
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn count_driven_and_mse_are_registered() {
		assert!(make_by_name("count_driven").is_ok());
		assert!(make_by_name("mse").is_ok());
	}

	#[test]
	fn unregistered_heuristic_is_an_error() {
		assert!(make_by_name("edsm").is_err());
		assert_eq!(HeuristicId::from_name("edsm"), Some(HeuristicId::Edsm));
		assert_eq!(HeuristicId::from_name("bogus"), None);
	}
}
