use std::env;
use std::path::PathBuf;

use localrag_core::config::Config;
use localrag_core::tokenize::tokenize_for_bm25;
use localrag_core::traits::KeywordChannel;
use localrag_text::TantivyKeywordChannel;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [--limit N] [index_dir]", args[0]);
        eprintln!("Example: {} 'ISO 4406 16/14/11' --limit 5 ../dev_data/indexes/tantivy", args[0]);
        std::process::exit(1);
    }
    let config = Config::load()?;
    let query_text = &args[1];
    let mut limit = config.retrieval().bm25_top_k;
    let mut index_dir = config.data().tantivy_path();
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                Some(l) => { limit = l; i += 1; }
                None => { eprintln!("Error: --limit requires a number"); std::process::exit(1); }
            },
            other if !other.starts_with('-') => index_dir = PathBuf::from(other),
            _ => {}
        }
        i += 1;
    }

    let tokens = tokenize_for_bm25(query_text);
    println!("localrag-keyword-search\n=======================");
    println!("Query: {query_text}");
    println!("Tokens: {tokens:?}");
    println!("Index directory: {}", index_dir.display());
    let channel = TantivyKeywordChannel::open(&index_dir)?;
    let hits = channel.score(&tokens, limit, None).await?;
    println!("\nFound {} results", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.metadata.get("source").map_or("unknown", String::as_str);
        println!("\n  {}. bm25={:.4}  id={}  parent={}  source={}", i + 1, hit.bm25_score.unwrap_or_default(), hit.child_id, hit.parent_id(), source);
        println!("     {}", hit.text.chars().take(200).collect::<String>());
    }
    Ok(())
}
