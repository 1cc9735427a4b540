// FlowSim: Packet Flow Trace Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::{fs, path::PathBuf};

use clap::Parser;
use log::info;

use flowsim::prelude::*;

/// Trace flows through a data plane snapshot.
#[derive(Debug, Parser)]
struct Cli {
    /// JSON file containing the data plane snapshot.
    #[clap(long = "snapshot", short = 's')]
    snapshot: PathBuf,
    /// JSON file containing a list of flows.
    #[clap(long = "flows", short = 'f')]
    flows: PathBuf,
    /// JSON file containing the trace settings. Command-line flags take precedence.
    #[clap(long = "settings")]
    settings: Option<PathBuf>,
    /// Record routing and exit of a hop as a single step.
    #[clap(long = "compact", short = 'c')]
    compact: bool,
    /// Do not evaluate any filter.
    #[clap(long = "ignore-filters")]
    ignore_filters: bool,
    /// Maximum number of traces per flow.
    #[clap(long = "max-traces")]
    max_traces: Option<usize>,
    /// Maximum number of hops per trace.
    #[clap(long = "max-hops")]
    max_hops: Option<usize>,
    /// Number of worker threads (defaults to the number of CPUs).
    #[clap(long = "threads", short = 'j')]
    threads: Option<usize>,
    /// Print the traces as JSON.
    #[clap(long = "json")]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();

    let args = Cli::parse();

    let dp = SimDataPlane::from_json(&fs::read_to_string(&args.snapshot)?)?;
    let flows: Vec<Flow> = serde_json::from_str(&fs::read_to_string(&args.flows)?)?;

    let mut settings: TraceSettings = match &args.settings {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => TraceSettings::default(),
    };
    settings.compact_steps |= args.compact;
    settings.ignore_filters |= args.ignore_filters;
    settings.max_traces = args.max_traces.or(settings.max_traces);
    settings.max_hops = args.max_hops.or(settings.max_hops);

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

    info!("Tracing {} flows using {threads} threads", flows.len());
    let engine = TracerouteEngine::with_settings(&dp, settings);
    let result = pool.install(|| engine.trace_all(&flows))?;
    let delivered = result
        .values()
        .filter(|traces| traces.iter().any(|t| t.disposition.is_success()))
        .count();
    info!("{delivered} of {} flows reach their destination", result.len());

    if args.json {
        let result: Vec<(&Flow, &Vec<Trace>)> = result.iter().collect();
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for (flow, traces) in result.iter() {
            println!("Flow {flow}: {} trace(s)", traces.len());
            for trace in traces {
                println!("{trace}");
            }
        }
    }

    Ok(())
}
