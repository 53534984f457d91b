//! xbrl-filing CLI - load an XBRL filing and report what was resolved

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use xbrl_filing::{Parser, ParserConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// XBRL filing loader
#[derive(ClapParser)]
#[command(name = "xbrl-filing")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a filing (instance file, folder or zip archive)
    Parse {
        /// Input path
        input: PathBuf,

        /// Output facts, contexts and errors as JSON
        #[arg(short, long)]
        json: bool,

        /// Show statistics
        #[arg(short, long)]
        stats: bool,

        /// Parser configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Benchmark loading performance
    Bench {
        /// Input path
        input: PathBuf,

        /// Number of iterations
        #[arg(short, long, default_value = "100")]
        iterations: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ParserConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(ParserConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            input,
            json,
            stats,
            config,
        } => {
            let parser = Parser::new().with_config(load_config(config.as_ref())?);
            let start = Instant::now();
            let filing = parser
                .parse_file(&input)
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let elapsed = start.elapsed();

            if json {
                let contexts: Vec<_> = filing.contexts().collect();
                let errors: Vec<_> = filing.errors().iter().collect();
                let out = serde_json::json!({
                    "instance": filing.instance_uri().as_str(),
                    "stats": filing.stats(),
                    "facts": filing.facts(),
                    "contexts": contexts,
                    "errors": errors,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            let summary = filing.stats();
            let mark = if summary.errors == 0 {
                "✓".green().bold()
            } else {
                "!".yellow().bold()
            };
            println!("{} {}", mark, input.display());
            println!("  Instance: {}", filing.instance_uri());
            println!("  Facts: {}", summary.facts);
            println!("  Contexts: {}", summary.contexts);
            println!("  Units: {}", summary.units);
            println!("  Networks: {}", summary.networks);
            println!("  Components: {}", summary.components);

            if summary.errors > 0 {
                println!("  Errors: {}", summary.errors);
                for error in filing.errors().iter().take(5) {
                    println!("  {} {}", "ERROR:".red(), error);
                }
                if summary.errors > 5 {
                    println!("  ... and {} more errors", summary.errors - 5);
                }
            }

            if stats {
                println!("  Documents: {}", summary.documents);
                println!("  Report elements: {}", summary.report_elements);
                println!("  Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
                println!(
                    "  Throughput: {:.0} facts/sec",
                    summary.facts as f64 / elapsed.as_secs_f64()
                );
            }
        }

        Commands::Bench { input, iterations } => {
            let parser = Parser::new();
            let iterations = iterations.max(1);

            // Warmup
            for _ in 0..3 {
                let _ = parser.parse_file(&input)?;
            }

            let mut times = Vec::with_capacity(iterations);
            let mut facts = 0;

            for _ in 0..iterations {
                let start = Instant::now();
                let filing = parser.parse_file(&input)?;
                times.push(start.elapsed());
                facts = filing.facts().len();
            }

            times.sort();
            let min = times[0];
            let max = times[times.len() - 1];
            let median = times[times.len() / 2];
            let mean = times.iter().sum::<std::time::Duration>() / times.len() as u32;

            println!("Benchmark Results for {}", input.display());
            println!("  Iterations: {}", iterations);
            println!("  Facts: {}", facts);
            println!("  Min:    {:.3}ms", min.as_secs_f64() * 1000.0);
            println!("  Median: {:.3}ms", median.as_secs_f64() * 1000.0);
            println!("  Mean:   {:.3}ms", mean.as_secs_f64() * 1000.0);
            println!("  Max:    {:.3}ms", max.as_secs_f64() * 1000.0);
            println!(
                "  Throughput: {:.0} facts/sec",
                facts as f64 / mean.as_secs_f64()
            );
        }
    }

    Ok(())
}
