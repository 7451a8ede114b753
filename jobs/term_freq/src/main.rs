use anyhow::Result;
use clap::Parser;
use mapfold::api::ExecutablePipeline;
use mapfold::constants::{DEFAULT_DOC_WIDTH, DEFAULT_TOKEN_WIDTH};
use mapfold::{FrequencyReducer, JobSpec, RuntimeConfig, RuntimePipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "term-freq", about = "Count token occurrences per document in '<doc id>,<sentence>' lines")]
struct Args {
    /// Input file or directory (repeatable)
    #[arg(long, required = true, num_args = 1..)]
    input: Vec<String>,
    /// Output directory
    #[arg(long)]
    output: String,
    /// Width of the left-justified token column
    #[arg(long, default_value_t = DEFAULT_TOKEN_WIDTH)]
    token_width: usize,
    /// Width of the right-justified document id column
    #[arg(long, default_value_t = DEFAULT_DOC_WIDTH)]
    doc_width: usize,
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

    let mut config = RuntimeConfig::from_env();
    if let Some(n) = args.reducers {
        config = config.with_num_reducers(n);
    }
    let mut pipeline = RuntimePipeline::with_config(config);
    for input in &args.input {
        pipeline.add_input(input);
    }
    pipeline.add_output(&args.output);

    let reducer = FrequencyReducer::new(args.token_width, args.doc_width);
    let job = JobSpec::term_freq(reducer);
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
