use localrag_core::tokenize::tokenize_for_bm25;
use localrag_core::traits::KeywordChannel;
use localrag_core::types::{ChildChunk, Meta, MetadataFilter};
use localrag_text::{TantivyIndexer, TantivyKeywordChannel};
use tempfile::TempDir;

fn child(id: &str, parent: &str, source: &str, section: &str, text: &str) -> ChildChunk {
    let mut metadata = Meta::new();
    metadata.insert("source".into(), source.into());
    metadata.insert("parent_id".into(), parent.into());
    metadata.insert("section".into(), section.into());
    ChildChunk { id: id.into(), text: text.into(), parent_id: parent.into(), metadata }
}

fn corpus() -> Vec<ChildChunk> {
    vec![
        child("c1", "p1", "iso_cleanliness.md", "codes", "ISO 4406 code 16/14/11 sets particle counts per millilitre."),
        child("c2", "p1", "iso_cleanliness.md", "intro", "Cleanliness codes describe hydraulic fluid contamination."),
        child("c3", "p2", "Pall_Filters.pdf", "codes", "Filter element DHP-1234 keeps fluid at 16/14/11 or better."),
        child("c4", "p3", "pump_notes.md", "intro", "Gear pumps tolerate moderate contamination levels."),
    ]
}

#[tokio::test]
async fn tantivy_full_flow() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("tantivy");
    let indexer = TantivyIndexer::create(&dir).expect("indexer");
    indexer.index(&corpus()).expect("index");

    let channel = TantivyKeywordChannel::open(&dir).expect("channel");
    assert_eq!(channel.num_docs(), 4);

    let hits = channel.score(&tokenize_for_bm25("16/14/11"), 10, None).await.expect("score");
    let ids: Vec<_> = hits.iter().map(|h| h.child_id.as_str()).collect();
    assert_eq!(hits.len(), 2, "{ids:?}");
    assert!(ids.contains(&"c1") && ids.contains(&"c3"));
    assert!(hits.iter().all(|h| h.bm25_score.is_some_and(|s| s > 0.0) && h.semantic_score.is_none()));
    assert!(hits.windows(2).all(|w| w[0].bm25_score >= w[1].bm25_score));
    assert_eq!(hits.iter().find(|h| h.child_id == "c3").map(|h| h.parent_id()), Some("p2"));

    let part = channel.score(&tokenize_for_bm25("DHP-1234"), 10, None).await.expect("score");
    assert_eq!(part.len(), 1);
    assert_eq!(part[0].child_id, "c3");
    assert_eq!(part[0].metadata.get("source").map(String::as_str), Some("Pall_Filters.pdf"));
}

#[tokio::test]
async fn zero_score_and_empty_queries_return_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("tantivy");
    TantivyIndexer::create(&dir).expect("indexer").index(&corpus()).expect("index");
    let channel = TantivyKeywordChannel::open(&dir).expect("channel");

    assert!(channel.score(&[], 10, None).await.expect("empty").is_empty());
    assert!(channel.score(&tokenize_for_bm25("turbine"), 10, None).await.expect("miss").is_empty());
    assert!(channel.score(&tokenize_for_bm25("contamination"), 0, None).await.expect("k=0").is_empty());
}

#[tokio::test]
async fn filters_apply_inside_and_after_the_index() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("tantivy");
    TantivyIndexer::create(&dir).expect("indexer").index(&corpus()).expect("index");
    let channel = TantivyKeywordChannel::open(&dir).expect("channel");
    let tokens = tokenize_for_bm25("contamination codes 16/14/11");

    let by_source = MetadataFilter::new().with("source", "iso_cleanliness.md");
    let hits = channel.score(&tokens, 10, Some(&by_source)).await.expect("score");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.metadata.get("source").map(String::as_str) == Some("iso_cleanliness.md")));

    let by_section = MetadataFilter::new().with("section", "intro");
    let hits = channel.score(&tokens, 1, Some(&by_section)).await.expect("score");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("section").map(String::as_str), Some("intro"));
}

#[tokio::test]
async fn replace_all_is_visible_after_reload() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("tantivy");
    let indexer = TantivyIndexer::create(&dir).expect("indexer");
    indexer.index(&corpus()).expect("index");
    let channel = TantivyKeywordChannel::open(&dir).expect("channel");

    let before = channel.score(&tokenize_for_bm25("gear pumps"), 10, None).await.expect("before");
    assert_eq!(before.len(), 1);

    indexer
        .replace_all(&[child("c9", "p9", "valves.md", "intro", "Relief valves limit system pressure.")])
        .expect("replace");
    channel.reload().expect("reload");

    assert!(channel.score(&tokenize_for_bm25("gear pumps"), 10, None).await.expect("after").is_empty());
    let hits = channel.score(&tokenize_for_bm25("relief valves"), 10, None).await.expect("after");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].child_id, "c9");
}
