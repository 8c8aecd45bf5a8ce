use clap::Parser;
use shopee_replay::cli::Args;
use shopee_replay::picker::pick_record;
use shopee_replay::report::error_json;
use shopee_replay::{Config, FfmpegMuxer, Pipeline, ReplayError, Result, RunReport};
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(&args).await {
        Ok(report) => {
            if args.json {
                print_json(&report);
            } else {
                for output in report.outputs() {
                    println!("Saved: {}", output.display());
                }
                println!(
                    "Successfully downloaded {}/{} records",
                    report.succeeded,
                    report.records.len()
                );
            }
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!("{e}");
            if args.json {
                print_json(&error_json(&e));
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(args: &Args) -> Result<RunReport> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config)?;

    let prompted = if args.has_input() {
        None
    } else {
        Some(prompt("Enter Shopee live replay URL or session ID: ")?)
    };
    let input = args.resolve(prompted.as_deref())?;

    let muxer = FfmpegMuxer::new(config.ffmpeg.clone(), config.mux_timeout());
    let show_progress = !args.quiet && !args.json && io::stderr().is_terminal();
    let pipeline = Pipeline::new(config, muxer)?
        .with_progress(show_progress)
        .with_output_name(args.output.clone());

    let mut records = pipeline.resolve_records(&input).await?;
    if args.pick && input.record_id.is_none() && records.len() > 1 {
        records = vec![pick_record(&records)?];
    }
    if !args.json && input.record_id.is_none() {
        println!(
            "Found {} record(s) for session {}",
            records.len(),
            input.session_id
        );
    }
    pipeline.run_records(&input.session_id, &records).await
}

fn prompt(message: &str) -> Result<String> {
    let stdin_err = |e: io::Error| ReplayError::InputValidation(format!("can't read stdin: {e}"));
    print!("{message}");
    io::stdout().flush().map_err(stdin_err)?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(stdin_err)?;
    Ok(line)
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: can't serialise report: {e}"),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("shopee_replay=debug,info")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(io::stderr),
        )
        .init();
}
