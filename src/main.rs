use std::io::{Write, stdout};
use std::path::{Path, PathBuf};

use cache_sim::{Geometry, Simulation, Summary, TraceFile};
use clap::Parser;
use eyre::{Result, WrapErr, eyre};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "csim",
    version,
    about = "Replays a valgrind memory trace against an LRU set-associative cache",
    after_help = "Examples:\n  csim -s 4 -E 1 -b 4 -t traces/yi.trace\n  csim -v -s 8 -E 2 -b 4 -t traces/yi.trace"
)]
struct Cli {
    /// Print the outcome of every access
    #[arg(short, long)]
    verbose: bool,

    /// Number of set index bits (2^s sets)
    #[arg(short = 's', value_name = "num")]
    set_index_bits: u32,

    /// Number of lines per set
    #[arg(short = 'E', value_name = "num")]
    lines_per_set: usize,

    /// Number of block offset bits (2^b bytes per block)
    #[arg(short = 'b', value_name = "num")]
    block_offset_bits: u32,

    /// Trace file to replay
    #[arg(short = 't', value_name = "file")]
    trace: PathBuf,

    /// Also write "hits misses evictions" to this file
    #[arg(long, value_name = "file")]
    results: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let geometry = Geometry::new(cli.set_index_bits, cli.lines_per_set, cli.block_offset_bits);
    let mut simulation = Simulation::new(geometry).wrap_err("invalid cache geometry")?;
    tracing::info!(%geometry, "cache ready");

    let file_content = std::fs::read_to_string(&cli.trace)
        .wrap_err_with(|| format!("failed to read trace file {}", cli.trace.display()))?;
    let trace = TraceFile::try_from(file_content.as_str())
        .map_err(|e| eyre!("failed to parse access trace file:\n{e}"))?;

    let mut stdout = stdout().lock();
    let summary = replay(&mut simulation, &trace, cli.verbose, &mut stdout)
        .wrap_err("failed to write verbose output")?;

    writeln!(stdout, "{summary}")?;

    if let Some(results) = &cli.results {
        write_results(results, &summary)
            .wrap_err_with(|| format!("failed to write results to {}", results.display()))?;
    }

    tracing::info!(
        "hit rate {:.3}%, miss rate {:.3}%",
        summary.percent_hit(),
        summary.percent_miss()
    );

    Ok(())
}

/// Runs the trace, writing one `K addr,size outcome[ outcome]` line per data
/// operation to `out` when `verbose` is set.
fn replay(
    simulation: &mut Simulation,
    trace: &TraceFile,
    verbose: bool,
    out: &mut impl Write,
) -> std::io::Result<Summary> {
    let mut write_result = Ok(());
    let summary = simulation.run(trace.operations(), |operation, step| {
        if verbose && write_result.is_ok() {
            write_result = writeln!(out, "{operation} {step}");
        }
    });

    write_result.map(|()| summary)
}

fn write_results(path: &Path, summary: &Summary) -> std::io::Result<()> {
    std::fs::write(
        path,
        format!("{} {} {}\n", summary.hits, summary.misses, summary.evictions),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_cachelab_flags() {
        let cli = Cli::try_parse_from([
            "csim", "-v", "-s", "4", "-E", "2", "-b", "5", "-t", "traces/yi.trace",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.set_index_bits, 4);
        assert_eq!(cli.lines_per_set, 2);
        assert_eq!(cli.block_offset_bits, 5);
        assert_eq!(cli.trace, PathBuf::from("traces/yi.trace"));
        assert_eq!(cli.results, None);
    }

    #[test]
    fn rejects_negative_and_missing_values() {
        assert!(Cli::try_parse_from(["csim", "-s", "-1", "-E", "1", "-b", "0", "-t", "f"]).is_err());
        assert!(Cli::try_parse_from(["csim", "-s", "1", "-E", "1", "-b", "0"]).is_err());
    }

    const TRACE: &str = "I 0400d7d4,8\n L 10,1\n M 20,1\n L 22,1\n S 18,1\n L 110,1\n L 210,1\n M 12,1\n";

    fn yi_simulation() -> Simulation {
        Simulation::new(Geometry::new(4, 1, 4)).unwrap()
    }

    #[test]
    fn verbose_replay_prints_each_operation() {
        let trace = TraceFile::try_from(TRACE).unwrap();
        let mut out = Vec::new();

        let summary = replay(&mut yi_simulation(), &trace, true, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "L 10,1 miss\n\
             M 20,1 miss hit\n\
             L 22,1 hit\n\
             S 18,1 hit\n\
             L 110,1 miss eviction\n\
             L 210,1 miss eviction\n\
             M 12,1 miss eviction hit\n"
        );
        assert_eq!(summary.to_string(), "hits:4 misses:5 evictions:3");
    }

    #[test]
    fn quiet_replay_prints_nothing() {
        let trace = TraceFile::try_from(TRACE).unwrap();
        let mut out = Vec::new();

        let summary = replay(&mut yi_simulation(), &trace, false, &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(summary.to_string(), "hits:4 misses:5 evictions:3");
    }

    #[test]
    fn writes_results_file() {
        let path = std::env::temp_dir().join(format!("csim_results_{}", std::process::id()));
        let summary = Summary {
            hits: 4,
            misses: 5,
            evictions: 3,
        };

        write_results(&path, &summary).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4 5 3\n");
        std::fs::remove_file(path).unwrap();
    }
}
