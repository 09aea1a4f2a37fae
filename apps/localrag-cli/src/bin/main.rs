use std::env;

use localrag_core::config::Config;
use localrag_hybrid::{gap_report, RetrievalEngine, SearchOptions};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: localrag <search|verify|gaps> [args...]
  search <query> [--top-k N] [--no-rerank] [--semantic-only|--bm25-only]
  verify <query> [--top-k N] [--no-rerank]
  gaps";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// Query text plus flags shared by `search` and `verify`.
fn parse_query(cmd: &str, args: &[String]) -> anyhow::Result<(String, SearchOptions)> {
    let mut query = None;
    let mut opts = SearchOptions::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" => {
                let n = args.get(i + 1).and_then(|v| v.parse::<usize>().ok());
                let Some(n) = n else { anyhow::bail!("--top-k requires a number") };
                opts = opts.top_k(n);
                i += 1;
            }
            "--no-rerank" => opts = opts.rerank(false),
            "--semantic-only" if cmd == "search" => opts = opts.weights(Some(1.0), Some(0.0)),
            "--bm25-only" if cmd == "search" => opts = opts.weights(Some(0.0), Some(1.0)),
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag for {cmd}: {flag}"),
            text => query = Some(query.map_or_else(|| text.to_string(), |q: String| format!("{q} {text}"))),
        }
        i += 1;
    }
    let Some(query) = query else { anyhow::bail!("{cmd} requires a query\n{USAGE}") };
    Ok((query, opts))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {e}"); e })?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "search" => {
            let (query, opts) = parse_query(&cmd, &args)?;
            let engine = RetrievalEngine::from_config(&config).await?;
            let report = engine.search_with_report(&query, &opts).await?;
            println!("Query: {query}");
            println!("Weights: semantic={:.2} bm25={:.2}  reranked={}", report.weights.semantic, report.weights.bm25, report.reranked);
            println!("Hits: semantic={} keyword={} fused={}", report.num_semantic, report.num_keyword, report.num_candidates);
            for d in &report.degradations { println!("DEGRADED: {d}"); }
            for (i, r) in report.results.iter().enumerate() {
                println!(
                    "\n  {}. score={:.4} ({:?})  semantic={:.4}  bm25={:.4}  source={}",
                    i + 1, r.rerank_score, r.score_kind, r.semantic_score, r.bm25_score, r.source
                );
                println!("     {}", truncate(&r.parent_text, 300));
            }
        }
        "verify" => {
            let (query, opts) = parse_query(&cmd, &args)?;
            let engine = RetrievalEngine::from_config(&config).await?;
            let answer = engine.verified_query(&query, &opts).await?;
            println!("Query: {query}");
            println!("Confidence: {} (top score {:.4}, {} results, {} sources)",
                answer.confidence.level, answer.confidence.top_score, answer.confidence.num_results, answer.confidence.num_sources);
            println!("Reasoning: {}", answer.confidence.reasoning);
            if !answer.warnings.is_empty() {
                println!("\nWarnings:");
                for w in &answer.warnings { println!("  - {w}"); }
            }
            println!("\nCitations:");
            for c in answer.citations.iter().take(5) { println!("  {c}"); }
            println!("\nChunks:");
            for (i, r) in answer.results.iter().take(5).enumerate() {
                println!("\n  [{}] {} (score {:.4})", i + 1, r.source, r.rerank_score);
                println!("  {}", truncate(&r.parent_text, 500));
            }
            println!("\nGap logged: {}", answer.gap_logged);
        }
        "gaps" => {
            let path = config.data().gap_tracker();
            let report = gap_report(&path)?;
            if report.entries.is_empty() {
                println!("No knowledge gaps recorded in {}", path.display());
                return Ok(());
            }
            println!("Knowledge gaps: {} queries ({} distinct) from {}", report.total, report.entries.len(), path.display());
            for g in &report.entries {
                let asked = if g.asked > 1 { format!(" (asked {}x)", g.asked) } else { String::new() };
                println!("\n  \"{}\"{asked}", g.query);
                println!("    score={:.3}  results={}  last={}", g.top_score, g.num_results, g.last_seen.format("%Y-%m-%d"));
            }
        }
        _ => { eprintln!("Unknown command: {cmd}\n{USAGE}"); std::process::exit(1); }
    }
    Ok(())
}
