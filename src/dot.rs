//! DOT writer (C11): renders the committed automaton plus the candidate
//! frontier as `digraph DFA { ... }`, grounded on the original tool's
//! per-evaluator `print_dot` (here, `Evaluator::payload_summary`).
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Write;

use crate::apta::NodeId;
use crate::merger::Merger;

fn render_node_transitions(out: &mut impl Write, merger: &Merger, node: NodeId) -> std::io::Result<()> {
	let data = merger.apta().node(node).data.clone();
	writeln!(out, "\t{} [shape=circle label=\"{}\"];", merger.apta().node(node).number, merger.evaluator_summary(&data))?;

	let mut sinks: BTreeSet<i32> = BTreeSet::new();
	let mut children: BTreeMap<NodeId, Vec<u32>> = BTreeMap::new();

	for symbol in 0..merger.apta().alphabet_size() {
		let Some(child) = merger.apta().get_child(node, symbol) else { continue };
		let sink_type: i32 = merger.sink_type(child);
		if sink_type != -1 {
			sinks.insert(sink_type);
		} else {
			children.entry(child).or_default().push(symbol);
		}
	}

	for sink_type in sinks {
		write!(out, "\tS{}t{} [label=\"sink {}\" shape=box];\n", merger.apta().node(node).number, sink_type, sink_type)?;
		write!(out, "\t\t{} -> S{}t{} [label=\"", merger.apta().node(node).number, merger.apta().node(node).number, sink_type)?;
		for symbol in 0..merger.apta().alphabet_size() {
			if let Some(child) = merger.apta().get_child(node, symbol) {
				if merger.sink_type(child) == sink_type {
					write!(out, " {} ", merger.apta().alphabet()[symbol as usize])?;
				}
			}
		}
		writeln!(out, "\"];")?;
	}

	for (child, symbols) in children {
		write!(out, "\t\t{} -> {} [label=\"", merger.apta().node(node).number, merger.apta().node(child).number)?;
		for symbol in symbols {
			write!(out, " {} ", merger.apta().alphabet()[symbol as usize])?;
		}
		writeln!(out, "\"];")?;
	}

	Ok(())
}

/// Writes the full `digraph DFA { ... }`: root, committed red states, and the
/// non-sink candidate frontier (sinks collapse into pseudo-nodes per type).
pub fn write_dot(out: &mut impl Write, merger: &Merger) -> std::io::Result<()> {
	writeln!(out, "digraph DFA {{")?;

	let root: NodeId = merger.apta().find(merger.apta().root());
	writeln!(out, "\t{} [label=\"root\" shape=box];", merger.apta().node(root).number)?;
	writeln!(out, "\t\tI -> {};", merger.apta().node(root).number)?;

	for &red in merger.red_states() {
		render_node_transitions(out, merger, red)?;
	}

	for candidate in merger.candidate_states() {
		render_node_transitions(out, merger, candidate)?;
	}

	writeln!(out, "}}")?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::config::Config;
	use crate::evaluator::Payload;
	use crate::evaluators::state_driven::StateDrivenEvaluator;
	use crate::evaluators::state_driven::StateDrivenPayload;

	#[test]
	fn writes_root_and_closing_brace() {
		let apta = crate::apta::Apta::new(vec!["a".to_owned()], Payload::StateDriven(StateDrivenPayload::default()));
		let merger: Merger = Merger::new(apta, Box::new(StateDrivenEvaluator::new()), Config::default(), None);
		let mut buffer: Vec<u8> = Vec::new();
		write_dot(&mut buffer, &merger).unwrap();
		let output: String = String::from_utf8(buffer).unwrap();
		assert!(output.starts_with("digraph DFA {"));
		assert!(output.trim_end().ends_with('}'));
		assert!(output.contains("root"));
	}
}
