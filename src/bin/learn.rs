//! CLI binary (C13): wires the trace/safety adapters, configuration surface,
//! and the merge engine's search loop into a runnable tool.
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use state_merge::apta::Apta;
use state_merge::config::ConfigBuilder;
use state_merge::dot::write_dot;
use state_merge::merger::Merger;
use state_merge::registry;
use state_merge::safety::SafetyDfa;
use state_merge::safety::SafetyDfaSpec;
use state_merge::trace;
use tracing::debug;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "Infers a DFA from labeled traces by state merging")]
struct Args {
	#[arg(long)]
	traces: PathBuf,

	#[arg(long)]
	safety: Option<PathBuf>,

	#[arg(long, default_value = "count_driven")]
	heuristic: String,

	#[arg(long, default_value_t = 1)]
	state_count: u64,

	#[arg(long, default_value_t = 1)]
	symbol_count: u64,

	#[arg(long, default_value_t = 0.0)]
	check_parameter: f64,

	#[arg(long, default_value_t = 0)]
	lower_bound: i64,

	#[arg(long, default_value_t = false)]
	use_sinks: bool,

	#[arg(long, default_value_t = false)]
	red_fixed: bool,

	#[arg(long, default_value_t = false)]
	merge_sinks_dsolve: bool,

	#[arg(long, default_value_t = false)]
	merge_when_testing: bool,

	#[arg(long, default_value_t = false)]
	merge_blue_blue: bool,

	#[arg(long, default_value_t = false)]
	merge_most_visited: bool,

	#[arg(short = 'o', long)]
	output: Option<PathBuf>,

	#[arg(long, default_value_t = false)]
	debug: bool,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	let args: Args = Args::parse();
	state_merge::debug::set_debug(args.debug);

	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(message) => {
			eprintln!("error: {message}");
			ExitCode::FAILURE
		}
	}
}

fn run(args: Args) -> Result<(), String> {
	let config = ConfigBuilder::new()
		.heuristic(registry::HeuristicId::from_name(&args.heuristic).ok_or_else(|| format!("unknown heuristic `{}`", args.heuristic))?)
		.state_count(args.state_count)
		.symbol_count(args.symbol_count)
		.check_parameter(args.check_parameter)
		.lower_bound(args.lower_bound)
		.use_sinks(args.use_sinks)
		.red_fixed(args.red_fixed)
		.merge_sinks_dsolve(args.merge_sinks_dsolve)
		.merge_when_testing(args.merge_when_testing)
		.merge_blue_blue(args.merge_blue_blue)
		.merge_most_visited(args.merge_most_visited)
		.build();

	let evaluator = registry::make_by_name(&args.heuristic).map_err(|err| format!("{}: no evaluator registered", err.requested))?;

	let trace_content: String = fs::read_to_string(&args.traces).map_err(|err| format!("reading {}: {err}", args.traces.display()))?;
	let (alphabet_size, traces) = trace::parse_traces(&trace_content).map_err(|err| err.to_string())?;
	info!(count = traces.len(), alphabet_size, "parsed traces");

	let alphabet: Vec<String> = (0..alphabet_size).map(|symbol| symbol.to_string()).collect();
	let mut apta: Apta = Apta::new(alphabet, evaluator.new_payload());
	for trace in &traces {
		apta.insert_trace(evaluator.as_ref(), trace.trace_type, &trace.entries);
	}

	let safety: Option<SafetyDfa> = match &args.safety {
		None => None,
		Some(path) => {
			let content: String = fs::read_to_string(path).map_err(|err| format!("reading {}: {err}", path.display()))?;
			let spec: SafetyDfaSpec = serde_yaml::from_str(&content).map_err(|err| format!("parsing {}: {err}", path.display()))?;
			let mut dfa: SafetyDfa = SafetyDfa::from_spec(spec).map_err(|err| err.to_string())?;
			dfa.initialize_apta(&mut apta).map_err(|err| err.to_string())?;
			Some(dfa)
		}
	};

	let mut merger: Merger = Merger::new(apta, evaluator, config, safety);
	merger.run();
	debug!(red = merger.red_states().len(), "search converged");

	match args.output {
		Some(path) => {
			let mut file = fs::File::create(&path).map_err(|err| format!("writing {}: {err}", path.display()))?;
			write_dot(&mut file, &merger).map_err(|err| err.to_string())
		}
		None => write_dot(&mut io::stdout().lock(), &merger).map_err(|err| err.to_string()),
	}
}
