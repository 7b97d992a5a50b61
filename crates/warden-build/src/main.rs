//! `warden` command-line interface

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warden_core::WardenConfig;
use warden_evidence::{verify, EvidenceLog};
use warden_patch::validate_diff;

fn cli() -> Command {
    let log_arg = || {
        Arg::new("log")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Path to a JSONL evidence log")
    };
    Command::new("warden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect warden evidence logs and check diffs")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit operational logs as JSON"),
        )
        .subcommand(
            Command::new("verify")
                .about("Recompute every line's hash and report tampering")
                .arg(log_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("tail")
                .about("Print the last entries of a log")
                .arg(log_arg())
                .arg(
                    Arg::new("lines")
                        .short('n')
                        .long("lines")
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("Number of entries"),
                ),
        )
        .subcommand(
            Command::new("project")
                .about("Fold the log into id -> latest entry")
                .arg(log_arg()),
        )
        .subcommand(
            Command::new("check-diff")
                .about("Validate a unified diff without applying it")
                .arg(
                    Arg::new("diff")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Diff file"),
                )
                .arg(
                    Arg::new("repo")
                        .long("repo")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Repository root the diff must stay inside"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<WardenConfig> {
    let path = matches.get_one::<PathBuf>("config");
    WardenConfig::load(path.map(PathBuf::as_path)).context("loading configuration")
}

fn log_path(args: &ArgMatches) -> Result<&PathBuf> {
    args.get_one::<PathBuf>("log").context("missing log path")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("verify", args)) => {
            let path = log_path(args)?;
            let key = config.evidence.hmac_key.as_deref().map(str::as_bytes);
            let report = verify(path, key).with_context(|| format!("verifying {}", path.display()))?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Evidence Log Verification");
                println!("=========================");
                println!("File: {}", path.display());
                println!("Total lines: {}", report.total);
                println!("Valid: {}", report.valid);
                println!("Invalid: {}", report.invalid);
                println!("Legacy (unsigned): {}", report.skipped_legacy);
                println!("Chain breaks: {}", report.chain_breaks);
                if key.is_some() {
                    println!("Missing HMAC: {}", report.missing_hmac);
                }
                if let Some(line) = report.first_invalid_line {
                    println!("First invalid line: {line}");
                }
                println!("Status: {}", if report.invalid == 0 { "PASSED" } else { "FAILED" });
            }
            std::process::exit(i32::from(report.invalid > 0));
        }
        Some(("tail", args)) => {
            let path = log_path(args)?;
            let n = args.get_one::<usize>("lines").copied().unwrap_or(10);
            let log = EvidenceLog::from_config(path, &config.evidence);
            for entry in log.tail(n)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Some(("project", args)) => {
            let path = log_path(args)?;
            let log = EvidenceLog::from_config(path, &config.evidence);
            println!("{}", serde_json::to_string_pretty(&log.project_latest()?)?);
        }
        Some(("check-diff", args)) => {
            let diff_path = args.get_one::<PathBuf>("diff").context("missing diff path")?;
            let repo = args.get_one::<PathBuf>("repo").context("missing repo")?;
            let text = std::fs::read_to_string(diff_path)
                .with_context(|| format!("reading {}", diff_path.display()))?;
            match validate_diff(&text, repo, config.patch.max_diff_bytes) {
                Ok(diff) => {
                    println!("OK: {} file(s)", diff.files.len());
                    for path in diff.paths() {
                        println!("  {path}");
                    }
                }
                Err(error) => {
                    println!("REJECTED: {error}");
                    std::process::exit(1);
                }
            }
        }
        _ => {}
    }
    Ok(())
}
