// src/main.rs

use anyhow::Context;
use clap::Parser;
use git_asserts::cli::{Args, Command, Format};
use git_asserts::report::{export_json, export_path, Summary};
use git_asserts::{mine_all, propagate, scan_revision};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run_mine(repos: &[PathBuf], output: Option<&Path>, top: usize, format: Format, config: &git_asserts::MineConfig) -> bool {
    let start_time = Instant::now();
    let mut ok = true;

    for (repo, result) in repos.iter().zip(mine_all(repos, config)) {
        let mined = match result {
            Ok(mined) => mined,
            Err(e) => {
                error!(repo = %repo.display(), error = %e, "mining failed");
                ok = false;
                continue;
            }
        };
        let deltas = match propagate(&mined.history) {
            Ok(deltas) => deltas,
            Err(e) => {
                error!(repo = %repo.display(), error = %e, "delta propagation failed");
                ok = false;
                continue;
            }
        };

        let summary = Summary::new(&mined, &deltas, top);
        match format {
            Format::Text => print!("{}", summary.render_text()),
            Format::Json => match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(error = %e, "could not serialize summary"),
            },
        }

        if let Some(dir) = output {
            let path = export_path(dir, repo);
            if let Err(e) = export_json(&path, &mined, &deltas, &summary) {
                error!(path = %path.display(), error = %e, "export failed");
                ok = false;
            }
        }
    }

    eprintln!("Total time: {:.2?}", start_time.elapsed());
    ok
}

fn run_scan(repo: &Path, format: Format, config: &git_asserts::MineConfig) -> anyhow::Result<()> {
    let snapshot = scan_revision(repo, config).with_context(|| format!("scanning {}", repo.display()))?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&snapshot.files)?),
        Format::Text => {
            println!("Revision {}", snapshot.commit);
            for file in &snapshot.files {
                for a in &file.confirmed {
                    println!("{}:{}: {}({})", file.path, a.start_lineno, a.name, a.predicate);
                }
                for a in &file.needs_inspection {
                    println!("{}:{}: {} [inspect: {:?}] {}", file.path, a.start_lineno, a.name, a.problem, a.raw_text());
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let ok = match &args.command {
        Command::Mine { repo, output, top, format, filters } => {
            run_mine(repo, output.as_deref(), *top, *format, &filters.to_config())
        }
        Command::Scan { repo, format, filters } => match run_scan(repo, *format, &filters.to_config()) {
            Ok(()) => true,
            Err(e) => {
                error!("{e:#}");
                false
            }
        },
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
