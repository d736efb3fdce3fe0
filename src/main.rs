mod args;
mod pivot;

use clap::Parser;
use log::{info, warn, LevelFilter};
use snafu::ErrorCompat;

use std::path::PathBuf;
use std::process::ExitCode;

use crate::args::Args;
use crate::pivot::config_reader::{read_config, PivotConfig};
use crate::pivot::{run_pivot, PivotError, PivotResult, RunSummary};

// Exit code when the cross-tab service reported a limit (EX_TEMPFAIL).
const EXIT_RETRY_LATER: u8 = 75;
const EXIT_FAILURE: u8 = 1;

fn exit_code(e: &PivotError) -> u8 {
    if e.is_quota_exceeded() {
        EXIT_RETRY_LATER
    } else {
        EXIT_FAILURE
    }
}

fn run(args: &Args) -> PivotResult<RunSummary> {
    let (mut config, base_dir) = match &args.config {
        Some(path) => read_config(path)?,
        None => (PivotConfig::default(), PathBuf::from(".")),
    };
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    config.apply_args(args, &cwd);
    run_pivot(&config, &base_dir, args.reference.clone())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("args: {:?}", args);

    match run(&args) {
        Ok(summary) => {
            println!(
                "read {} rows, wrote {} rows to {}",
                summary.rows_read, summary.rows_written, summary.raw_table_path
            );
            match summary.view {
                Some(outcome) => println!("view: {:?}", outcome),
                None => println!("view: skipped"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!("Error occured {:?}", e);
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_table::CrossTabError;

    #[test]
    fn quota_exits_with_retry_code() {
        let e = PivotError::CrossTab {
            source: CrossTabError::QuotaExceeded {
                view: "Summary".to_string(),
                message: "busy".to_string(),
            },
        };
        assert_eq!(exit_code(&e), EXIT_RETRY_LATER);
        let e = PivotError::InvalidConfiguration {
            message: "outputViewName must not be empty".to_string(),
        };
        assert_eq!(exit_code(&e), EXIT_FAILURE);
    }
}
