use anyhow::Result;
use clap::{Parser, ValueEnum};
use mapfold::api::ExecutablePipeline;
use mapfold::constants::{DEFAULT_INITIAL_LABEL, DEFAULT_MAX_GAP, DEFAULT_PASSTHROUGH_KEY};
use mapfold::{GapFillReducer, GapPolicy, JobSpec, RuntimeConfig, RuntimePipeline, ValueOrder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    /// One filler per missing index, every index emitted once
    FillAll,
    /// One filler per mismatch, counter not advanced past gaps
    Legacy,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OrderArg {
    Lexicographic,
    Numeric,
}

#[derive(Parser, Debug)]
#[command(name = "data-clean", about = "Fill gaps in numbered 'index,label' sequences")]
struct Args {
    /// Input file or directory (repeatable)
    #[arg(long, required = true, num_args = 1..)]
    input: Vec<String>,
    /// Output directory
    #[arg(long)]
    output: String,
    /// Key every record is grouped under
    #[arg(long, default_value = DEFAULT_PASSTHROUGH_KEY)]
    key: String,
    #[arg(long, value_enum, default_value_t = PolicyArg::FillAll)]
    gap_policy: PolicyArg,
    /// Ordering of values within the group [default: numeric for fill-all,
    /// lexicographic for legacy]
    #[arg(long, value_enum)]
    order: Option<OrderArg>,
    /// Label used for fillers before any entry has been seen
    #[arg(long, default_value = DEFAULT_INITIAL_LABEL)]
    initial_label: String,
    /// Widest gap filled under fill-all before the job fails
    #[arg(long, default_value_t = DEFAULT_MAX_GAP)]
    max_gap: u64,
    /// Number of reduce partitions
    #[arg(long)]
    reducers: Option<usize>,
    /// Print job statistics as JSON on stdout
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let policy = match args.gap_policy {
        PolicyArg::FillAll => GapPolicy::FillAll,
        PolicyArg::Legacy => GapPolicy::Legacy,
    };
    let order = match args.order {
        Some(OrderArg::Lexicographic) => ValueOrder::Lexicographic,
        Some(OrderArg::Numeric) => ValueOrder::NumericIndex,
        None => policy.natural_order(),
    };
    let reducer = GapFillReducer::new(policy, order)
        .with_initial_label(args.initial_label)
        .with_max_gap(args.max_gap);

    let mut config = RuntimeConfig::from_env();
    if let Some(n) = args.reducers {
        config = config.with_num_reducers(n);
    }
    let mut pipeline = RuntimePipeline::with_config(config);
    for input in &args.input {
        pipeline.add_input(input);
    }
    pipeline.add_output(&args.output);

    let job = JobSpec::data_clean(args.key, reducer);
    let name = job.name().to_string();
    let stats = job.run(&mut pipeline)?;
    info!(job = %name, job_id = %stats.job_id, output = %args.output,
          records_in = stats.map.total_records, records_out = stats.reduce.total_records_out,
          "job finished");
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}
