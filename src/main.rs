use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pageaudit::{analyze, AnalyzeOptions, ErrorReport, Report};

struct Args {
    pub url: String,
    pub output: Option<PathBuf>,
    pub trace: bool,
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("usage: pageaudit <url> [output.json] [--trace]");
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if args.trace {
        tracing_subscriber::fmt::fmt()
            .with_span_events(FmtSpan::ACTIVE)
            .with_max_level(Level::DEBUG)
            .with_env_filter(EnvFilter::from_default_env())
            .finish()
            .init();
        info!("Logger initialized");
    }

    match analyze(&args.url, &AnalyzeOptions::default()) {
        Ok(report) => {
            print_report(&report);
            if let Some(path) = &args.output {
                if let Err(err) = save_json(&report, path) {
                    eprintln!("could not save report: {}", err);
                    return ExitCode::FAILURE;
                }
                println!("\nFull results saved to {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let report = ErrorReport::from(&err);
            eprintln!("Analysis failed: {}", report.error);
            if let Some(path) = &args.output {
                if let Err(err) = save_json(&report, path) {
                    eprintln!("could not save report: {}", err);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();
    let trace = pargs.contains(["--trace", "-t"]);
    let args = Args {
        url: pargs.free_from_str()?,
        output: pargs.opt_free_from_str()?,
        trace,
    };
    Ok(args)
}

fn print_report(report: &Report) {
    println!("Analysis for {}", report.url);
    println!(
        "Score: {:.1}% ({}/{} checks passed)\n",
        report.score, report.passed, report.total
    );
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("[{}] {}: {}", status, check.rule, check.details);
    }
    let summary = &report.page_summary;
    println!("\nPage summary:");
    println!("  Title: {}", summary.title);
    println!(
        "  Meta description: {}",
        if summary.meta_description { "Present" } else { "Missing" }
    );
    println!(
        "  Links: {}  Images: {}  Scripts: {}  Styles: {}",
        summary.links, summary.images, summary.scripts, summary.styles
    );
    if report.recommendations.is_empty() {
        println!("\nAll checks passed.");
    } else {
        println!("\nRecommendations:");
        for (i, recommendation) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, recommendation);
        }
    }
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
