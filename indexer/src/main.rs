use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mmdb_core::{ColumnSpec, CsvDirectory, Engine, EngineConfig, IndexRegistry, RowSource};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mmdb")]
#[command(about = "Build and query in-memory BM25 indexes over CSV corpora", long_about = None)]
struct Cli {
    /// Directory holding the CSV corpora
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// Corpus name (CSV file stem)
    #[arg(long)]
    source: String,
    /// Column holding the document id
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    doc_id_col: i64,
    /// Column holding the text to index
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    text_col: i64,
    /// Extra columns to carry as display fields (repeatable)
    #[arg(long = "field")]
    fields: Vec<i64>,
    /// Drop English stopwords at build and query time
    #[arg(long, default_value_t = false)]
    stopwords: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the corpora available in the data directory
    Sources,
    /// Build an index and print its summary
    Build {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build an index, then run one query against it
    Search {
        #[command(flatten)]
        build: BuildArgs,
        /// Query text
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        k: i64,
    },
    /// Build an index, then time every query in a file (one per line)
    Bench {
        #[command(flatten)]
        build: BuildArgs,
        #[arg(long)]
        queries: PathBuf,
        #[arg(long, default_value_t = 10)]
        k: i64,
        /// Passes over the query file
        #[arg(long, default_value_t = 5)]
        rounds: usize,
    },
}

#[derive(Serialize)]
struct BenchReport {
    queries: usize,
    rounds: usize,
    mean_ms: f64,
    p50_ms: f64,
    p95_ms: f64,
    max_ms: f64,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let source = CsvDirectory::new(&cli.data_dir);

    match cli.command {
        Commands::Sources => {
            for name in source.list_sources()? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Build { build } => {
            let engine = build_engine(source, &build)?;
            let artifact = engine.registry().get(&build.source)?;
            let built_at = artifact.built_at().format(&Rfc3339).unwrap_or_default();
            let report = serde_json::json!({ "built_at": built_at, "stats": artifact.stats() });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Search { build, query, k } => {
            let engine = build_engine(source, &build)?;
            let outcome = engine.search(&build.source, &query, k)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Bench { build, queries, k, rounds } => {
            let engine = build_engine(source, &build)?;
            let text = fs::read_to_string(&queries).with_context(|| format!("reading {}", queries.display()))?;
            let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
            let report = bench(&engine, &build.source, &lines, k, rounds)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn build_engine(source: CsvDirectory, args: &BuildArgs) -> Result<Engine> {
    let config = EngineConfig { remove_stopwords: args.stopwords, ..EngineConfig::default() };
    let engine = Engine::new(IndexRegistry::new(), Arc::new(source), config);
    let spec = args.fields.iter().fold(ColumnSpec::new(args.doc_id_col, args.text_col), |s, &c| s.with_field(c));
    let summary = engine.build_index(&args.source, &spec)?;
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(engine)
}

fn bench(engine: &Engine, corpus: &str, queries: &[&str], k: i64, rounds: usize) -> Result<BenchReport> {
    let mut samples: Vec<f64> = Vec::with_capacity(queries.len() * rounds);
    for _ in 0..rounds {
        for q in queries {
            let start = Instant::now();
            engine.search(corpus, q, k)?;
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
        }
    }
    samples.sort_by(f64::total_cmp);
    let pct = |p: f64| -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let idx = ((samples.len() - 1) as f64 * p).round() as usize;
        samples[idx]
    };
    let mean_ms = if samples.is_empty() { 0.0 } else { samples.iter().sum::<f64>() / samples.len() as f64 };
    tracing::info!(samples = samples.len(), "benchmark complete");
    Ok(BenchReport {
        queries: queries.len(),
        rounds,
        mean_ms,
        p50_ms: pct(0.5),
        p95_ms: pct(0.95),
        max_ms: samples.last().copied().unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_command() {
        let cli = Cli::try_parse_from([
            "mmdb", "--data-dir", "/tmp/corpora", "search", "--source", "songs", "--text-col", "2", "--field", "1",
            "--query", "hello", "--k", "3",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/corpora"));
        match cli.command {
            Commands::Search { build, query, k } => {
                assert_eq!(build.source, "songs");
                assert_eq!((build.doc_id_col, build.text_col), (0, 2));
                assert_eq!(build.fields, vec![1]);
                assert_eq!((query.as_str(), k), ("hello", 3));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn bench_reports_percentiles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c.csv"), "id,text\n1,red apple\n2,green apple\n").unwrap();
        let args = BuildArgs { source: "c".into(), doc_id_col: 0, text_col: 1, fields: vec![], stopwords: false };
        let engine = build_engine(CsvDirectory::new(dir.path()), &args).unwrap();
        let report = bench(&engine, "c", &["apple", "red"], 5, 3).unwrap();
        assert_eq!(report.queries, 2);
        assert!(report.p50_ms <= report.p95_ms && report.p95_ms <= report.max_ms);
    }
}
