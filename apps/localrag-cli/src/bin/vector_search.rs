use std::env;
use std::path::PathBuf;

use localrag_core::config::{expand_path, Config};
use localrag_core::traits::SemanticChannel;
use localrag_embed::get_default_embedder;
use localrag_vector::LanceSemanticChannel;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [--limit N] [db_path] [table_name]", args[0]);
        eprintln!("Example: {} 'filter beta ratio' --limit 5 ../dev_data/indexes/lancedb children", args[0]);
        std::process::exit(1);
    }
    let config = Config::load()?;
    let query_text = &args[1];
    let mut limit = config.retrieval().semantic_top_k;
    let mut positional: Vec<&str> = Vec::new();
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                Some(l) => { limit = l; i += 1; }
                None => { eprintln!("Error: --limit requires a number"); std::process::exit(1); }
            },
            other if !other.starts_with('-') => positional.push(other),
            _ => {}
        }
        i += 1;
    }
    let db_path: PathBuf = positional.first().map_or_else(|| config.data().lancedb_path(), expand_path);
    let table_name = positional.get(1).copied().unwrap_or(config.data().child_collection.as_str());

    println!("localrag-vector-search\n======================");
    println!("Query: {query_text}");
    println!("Database path: {}", db_path.display());
    println!("Table: {table_name}");
    let embedder = get_default_embedder(config.data().embedding_model_dir.as_deref().map(expand_path).as_deref())?;
    let vector = embedder.embed_batch(&[query_text.clone()])?.pop().ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))?;
    let channel = LanceSemanticChannel::open(&db_path, table_name).await?;
    let hits = channel.query(&vector, limit, None).await?;
    println!("\nFound {} results", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.metadata.get("source").map_or("unknown", String::as_str);
        println!("\n  {}. similarity={:.4}  id={}  parent={}  source={}", i + 1, hit.semantic_score.unwrap_or_default(), hit.child_id, hit.parent_id(), source);
        println!("     {}", hit.text.chars().take(200).collect::<String>());
    }
    Ok(())
}
