//! Binary entry point for the edgeconv graph converter.
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use edgeconv::cli::{
    configure_thread_pool, init_logging, run_convert, CliError, ConvertConfig, ConvertSummary,
    TuningFile,
};

#[derive(Parser, Debug)]
#[command(
    name = "edgeconv",
    version,
    about = "Convert graphs between on-disk edge formats"
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Graph to read")]
    inputfile: PathBuf,

    #[arg(long, value_name = "FILE", help = "Graph to create")]
    outputfile: PathBuf,

    #[arg(
        long,
        value_name = "FORMAT",
        help = "Input format (binaryedgelist, textedgelist, textadjacencylist, matrix32, xstream)"
    )]
    inputformat: String,

    #[arg(long, value_name = "FORMAT", help = "Output format")]
    outputformat: String,

    #[arg(long, value_name = "OPTS", default_value = "", help = "Comma-separated input options")]
    inputoptions: String,

    #[arg(
        long,
        value_name = "OPTS",
        default_value = "",
        help = "Comma-separated output options (groupbysource, groupbydestination)"
    )]
    outputoptions: String,

    #[arg(
        long,
        value_name = "KIND",
        default_value = "void",
        help = "Per-edge data kind (void, int, float)"
    )]
    edgedata: String,

    #[arg(long, conflicts_with = "edgedata", help = "Same as --edgedata=void")]
    noedgedata: bool,

    #[arg(long, value_name = "NAME", help = "Edge data transform to apply (repeatable)")]
    transform: Vec<String>,

    #[arg(long, help = "Build the Vector-Sparse view and report its packing")]
    vectorsparse: bool,

    #[arg(long, help = "Feed the writer from the Vector-Sparse view")]
    write_vectorsparse: bool,

    #[arg(long, value_name = "MIB", help = "Size of each pipeline buffer")]
    buffer_mib: Option<usize>,

    #[arg(long, value_name = "N", help = "Read consumers and transform worker threads")]
    threads: Option<usize>,

    #[arg(long, value_name = "NODE", help = "NUMA node to run the pipeline on")]
    numa_node: Option<usize>,

    #[arg(long, help = "Leave pipeline threads unpinned")]
    no_pin: bool,

    #[arg(long, value_name = "FILE", help = "TOML tuning file with a [pipeline] table")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "warn", help = "Log filter (RUST_LOG overrides)")]
    log_level: String,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for the conversion summary"
    )]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                ErrorKind::MissingRequiredArgument => 2,
                _ => 1,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("error: {err}");
        return ExitCode::from(1);
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let edge_data = if cli.noedgedata { "void" } else { cli.edgedata.as_str() };
    let mut config = ConvertConfig::from_names(
        cli.inputfile,
        cli.outputfile,
        &cli.inputformat,
        &cli.outputformat,
        &cli.inputoptions,
        &cli.outputoptions,
        edge_data,
        &cli.transform,
    )?;
    if let Some(path) = cli.config.as_deref() {
        config.pipeline = TuningFile::load(path)?.pipeline;
    }
    if let Some(mib) = cli.buffer_mib {
        config.pipeline.buffer_bytes = buffer_bytes(mib)?;
    }
    if let Some(threads) = cli.threads {
        if threads == 0 {
            return Err("--threads must be at least 1".into());
        }
        config.pipeline.read_threads = Some(threads);
    }
    if let Some(node) = cli.numa_node {
        config.pipeline.numa_node = node;
    }
    if cli.no_pin {
        config.pipeline.pin_threads = false;
    }
    config.build_vector_sparse = cli.vectorsparse;
    config.write_from_vector_sparse = cli.write_vectorsparse;
    configure_thread_pool(cli.threads);

    let summary = run_convert(&config)?;
    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| CliError::Message(format!("cannot encode summary: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Text => print_summary_text(&summary),
    }
    Ok(())
}

fn buffer_bytes(mib: usize) -> Result<usize, CliError> {
    if mib == 0 {
        return Err("--buffer-mib must be at least 1".into());
    }
    mib.checked_mul(1 << 20)
        .ok_or_else(|| format!("--buffer-mib={mib} does not fit in the address space").into())
}

fn print_summary_text(summary: &ConvertSummary) {
    println!("vertices:          {}", summary.vertices);
    println!("edges:             {}", summary.edges);
    println!("edge data:         {}", summary.edge_data);
    println!(
        "vectors:           {} by source, {} by destination",
        summary.vectors_by_source, summary.vectors_by_destination
    );
    if summary.skipped_records > 0 {
        println!("skipped records:   {}", summary.skipped_records);
    }
    if let Some(efficiency) = summary.packing_efficiency {
        println!("packing:           {:.1}%", efficiency * 100.0);
    }
    println!("elapsed:           {:.1} ms", summary.duration_ms);
}
