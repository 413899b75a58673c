//! Trace-file adapter (C9): parses the line-oriented training-data format and
//! feeds each trace into [`crate::apta::Apta::insert_trace`].
//!
//! ```text
//! <num_traces> <alphabet_size>
//! <type> <length> <symbol>:<data> <symbol>:<data> ...
//! ...
//! ```
//! Generalizes the original tool's Abbadingo-style format by letting each
//! `symbol:data` pair carry an optional payload the evaluators consume via
//! `read_from`/`read_to`.
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::is_not;
use nom::bytes::complete::tag;
use nom::character::complete::char as nom_char;
use nom::character::complete::digit1;
use nom::character::complete::space1;
use nom::combinator::map_res;
use nom::combinator::opt;
use nom::multi::separated_list1;
use nom::sequence::separated_pair;

use crate::apta::Apta;
use crate::evaluator::Evaluator;

type ParsingResult<'a, T> = IResult<&'a str, T>;

/// A single parsed trace: its type tag and `(symbol_id, data)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
	pub trace_type: i32,
	pub entries: Vec<(u32, String)>,
}

/// One offending line, with enough context to report a useful parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParseError {
	pub line: usize,
	pub content: String,
}

impl std::fmt::Display for TraceParseError {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(fmt, "malformed trace file at line {}: `{}`", self.line, self.content)
	}
}

fn parse_int(input: &str) -> ParsingResult<'_, i32> {
	map_res(digit1, str::parse::<i32>).parse(input)
}

fn parse_uint(input: &str) -> ParsingResult<'_, u32> {
	map_res(digit1, str::parse::<u32>).parse(input)
}

fn parse_header(input: &str) -> ParsingResult<'_, (i32, u32)> {
	separated_pair(parse_int, space1, parse_uint).parse(input)
}

fn parse_symbol_data(input: &str) -> ParsingResult<'_, (u32, String)> {
	let (input, symbol) = parse_uint(input)?;
	let (input, _) = nom_char(':')(input)?;
	let (input, data) = opt(is_not(" \t")).parse(input)?;
	Ok((input, (symbol, data.unwrap_or("").to_owned())))
}

fn parse_trace_line(input: &str) -> ParsingResult<'_, Trace> {
	let (input, trace_type) = parse_int(input)?;
	let (input, _) = space1(input)?;
	let (input, _length) = parse_uint(input)?;
	let (input, entries) = opt((space1, separated_list1(space1, parse_symbol_data))).parse(input)?;
	let entries: Vec<(u32, String)> = entries.map(|(_, entries)| entries).unwrap_or_default();
	Ok((input, Trace { trace_type, entries }))
}

/// Parses the whole trace-file contents; the first line gives the declared
/// trace count and alphabet size (recorded but not enforced against the body
/// beyond what `parse_trace_line` already requires).
pub fn parse_traces(content: &str) -> Result<(u32, Vec<Trace>), TraceParseError> {
	let mut lines = content.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());

	let Some((header_line_no, header_line)) = lines.next() else {
		return Err(TraceParseError { line: 0, content: String::new() });
	};
	let (_, (_num_traces, alphabet_size)) =
		parse_header(header_line.trim()).map_err(|_| TraceParseError { line: header_line_no + 1, content: header_line.to_owned() })?;

	let mut traces: Vec<Trace> = Vec::new();
	for (line_no, line) in lines {
		let (_, trace) = parse_trace_line(line.trim()).map_err(|_| TraceParseError { line: line_no + 1, content: line.to_owned() })?;
		traces.push(trace);
	}

	Ok((alphabet_size, traces))
}

/// Parses `content` and inserts every trace into `apta` via the active evaluator's hooks.
pub fn load_traces(apta: &mut Apta, evaluator: &dyn Evaluator, content: &str) -> Result<usize, TraceParseError> {
	let (_, traces) = parse_traces(content)?;
	for trace in &traces {
		apta.insert_trace(evaluator, trace.trace_type, &trace.entries);
	}
	Ok(traces.len())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parses_header_and_traces() {
		let content = "2 2\n1 2 0:1.0 1:2.0\n0 1 0:3.0\n";
		let (alphabet_size, traces) = parse_traces(content).unwrap();
		assert_eq!(alphabet_size, 2);
		assert_eq!(traces.len(), 2);
		assert_eq!(traces[0].trace_type, 1);
		assert_eq!(traces[0].entries, vec![(0, "1.0".to_owned()), (1, "2.0".to_owned())]);
		assert_eq!(traces[1].entries, vec![(0, "3.0".to_owned())]);
	}

	#[test]
	fn parses_trace_with_no_entries() {
		let content = "1 1\n0 0\n";
		let (_, traces) = parse_traces(content).unwrap();
		assert_eq!(traces[0].entries, Vec::new());
	}

	#[test]
	fn rejects_malformed_header() {
		let content = "not-a-header\n1 0\n";
		assert!(parse_traces(content).is_err());
	}
}
