use localrag_core::traits::{Embedder, ParentStore, SemanticChannel};
use localrag_core::types::{ChildChunk, Meta, MetadataFilter, ParentChunk};
use localrag_embed::FakeEmbedder;
use localrag_vector::{LanceChunkWriter, LanceParentStore, LanceSemanticChannel, WriteMode};
use tempfile::TempDir;

const DIM: usize = 64;

fn child(id: &str, parent: &str, source: &str, text: &str) -> ChildChunk {
    let mut metadata = Meta::new();
    metadata.insert("source".into(), source.into());
    metadata.insert("parent_id".into(), parent.into());
    metadata.insert("kind".into(), if source.ends_with(".pdf") { "catalog".into() } else { "note".into() });
    ChildChunk { id: id.into(), text: text.into(), parent_id: parent.into(), metadata }
}

fn parent(id: &str, text: &str) -> ParentChunk {
    let mut metadata = Meta::new();
    metadata.insert("page".into(), "3".into());
    ParentChunk { id: id.into(), text: text.into(), metadata }
}

fn corpus() -> Vec<ChildChunk> {
    vec![
        child("c1", "p1", "iso_cleanliness.md", "ISO 4406 cleanliness code 16/14/11 particle counts"),
        child("c2", "p1", "iso_cleanliness.md", "hydraulic fluid contamination overview"),
        child("c3", "p2", "Pall_Filters.pdf", "filter element rated for ISO 4406 16/14/11"),
        child("c4", "p3", "pump_notes.md", "gear pump maintenance schedule"),
    ]
}

async fn seed(tmp: &TempDir) -> FakeEmbedder {
    let embedder = FakeEmbedder::new(DIM);
    let chunks = corpus();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).expect("embed");
    let writer = LanceChunkWriter::new(tmp.path()).await.expect("writer");
    writer.write_children("children", &chunks, &embeddings, WriteMode::Append).await.expect("children");
    writer
        .write_parents("parents", &[parent("p1", "ISO cleanliness section"), parent("p2", "Pall catalog page"), parent("p3", "Pump notes")], WriteMode::Append)
        .await
        .expect("parents");
    embedder
}

fn query_vec(embedder: &FakeEmbedder, q: &str) -> Vec<f32> {
    embedder.embed_batch(&[q.to_string()]).expect("embed").remove(0)
}

#[tokio::test]
async fn lancedb_full_flow() {
    let tmp = TempDir::new().expect("tmp");
    let embedder = seed(&tmp).await;
    let channel = LanceSemanticChannel::open(tmp.path(), "children").await.expect("channel");

    let hits = channel.query(&query_vec(&embedder, "ISO 4406 cleanliness code 16/14/11"), 3, None).await.expect("query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].child_id, "c1");
    assert!(hits.iter().all(|h| h.semantic_score.is_some_and(|s| (0.0..=1.0 + 1e-5).contains(&s)) && h.bm25_score.is_none()));
    assert!(hits.windows(2).all(|w| w[0].semantic_score >= w[1].semantic_score));
    assert_eq!(hits[0].parent_id(), "p1");
    assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("iso_cleanliness.md"));
}

#[tokio::test]
async fn filters_push_down_and_post_filter() {
    let tmp = TempDir::new().expect("tmp");
    let embedder = seed(&tmp).await;
    let channel = LanceSemanticChannel::open(tmp.path(), "children").await.expect("channel");
    let q = query_vec(&embedder, "ISO 4406 16/14/11");

    let by_source = MetadataFilter::new().with("source", "Pall_Filters.pdf");
    let hits = channel.query(&q, 10, Some(&by_source)).await.expect("query");
    assert_eq!(hits.iter().map(|h| h.child_id.as_str()).collect::<Vec<_>>(), vec!["c3"]);

    let by_kind = MetadataFilter::new().with("kind", "note");
    let hits = channel.query(&q, 2, Some(&by_kind)).await.expect("query");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.metadata.get("kind").map(String::as_str) == Some("note")));
}

#[tokio::test]
async fn parents_are_fetched_by_id() {
    let tmp = TempDir::new().expect("tmp");
    seed(&tmp).await;
    let store = LanceParentStore::open(tmp.path(), "parents").await.expect("store");

    let found = store.fetch(&["p1".into(), "p3".into(), "missing".into()]).await.expect("fetch");
    assert_eq!(found.len(), 2);
    assert_eq!(found["p1"].text, "ISO cleanliness section");
    assert_eq!(found["p3"].metadata.get("page").map(String::as_str), Some("3"));
    assert!(store.fetch(&[]).await.expect("empty").is_empty());
}

#[tokio::test]
async fn replace_swaps_table_content() {
    let tmp = TempDir::new().expect("tmp");
    let embedder = seed(&tmp).await;
    let writer = LanceChunkWriter::new(tmp.path()).await.expect("writer");
    let fresh = vec![child("c9", "p9", "valves.md", "relief valve pressure setting")];
    let emb = embedder.embed_batch(&[fresh[0].text.clone()]).expect("embed");
    writer.write_children("children", &fresh, &emb, WriteMode::Replace).await.expect("replace");

    let channel = LanceSemanticChannel::open(tmp.path(), "children").await.expect("channel");
    let hits = channel.query(&query_vec(&embedder, "gear pump"), 10, None).await.expect("query");
    assert_eq!(hits.iter().map(|h| h.child_id.as_str()).collect::<Vec<_>>(), vec!["c9"]);
}
