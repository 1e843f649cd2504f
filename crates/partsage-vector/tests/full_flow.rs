use std::sync::Arc;

use partsage_core::error::AdapterError;
use partsage_core::traits::{Embedder, SemanticStore};
use partsage_core::types::{EmbeddingChunk, SourceKind};
use partsage_embed::HashEmbedder;
use partsage_vector::table::{count_rows, open_db};
use partsage_vector::{ChunkWriter, LanceSemanticStore};

const DIM: usize = 64;

fn chunk(doc_id: &str, source: SourceKind, index: usize, total: usize, title: &str, content: &str) -> EmbeddingChunk {
	EmbeddingChunk {
		id: format!("{}:{}#{}", source.as_str(), doc_id, index),
		doc_id: doc_id.to_string(),
		source,
		title: title.to_string(),
		url: Some(format!("https://www.partselect.com/{doc_id}")),
		content: content.to_string(),
		chunk_index: index,
		total_chunks: total,
	}
}

fn fixture_chunks() -> Vec<EmbeddingChunk> {
	vec![
		chunk("refrigerator:ice-maker-not-making-ice", SourceKind::Repair, 0, 2, "Ice maker not making ice", "ice maker not making ice check the water inlet valve"),
		chunk("refrigerator:ice-maker-not-making-ice", SourceKind::Repair, 1, 2, "Ice maker not making ice", "replace the ice maker assembly if the valve is fine"),
		chunk("PS11752778", SourceKind::Part, 0, 1, "Refrigerator Door Shelf Bin", "door shelf bin for refrigerator doors"),
		chunk("https://www.partselect.com/blog/clean-filter", SourceKind::Blog, 0, 1, "How to clean a dishwasher filter", "dishwasher filter cleaning guide"),
	]
}

async fn build_store(dir: &std::path::Path) -> LanceSemanticStore {
	let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
	let writer = ChunkWriter::recreate(dir, "chunks", DIM).await.expect("writer");
	let written = writer.index_chunks(&fixture_chunks(), Arc::clone(&embedder)).await.expect("index");
	assert_eq!(written, 4);
	LanceSemanticStore::open(dir, "chunks", embedder).await.expect("store")
}

#[tokio::test]
async fn best_chunk_per_document_in_score_order() {
	let tmp = tempfile::tempdir().unwrap();
	let store = build_store(tmp.path()).await;

	let hits = store.nearest_neighbors("ice maker not making ice", 5, None).await.expect("search");
	assert!(!hits.is_empty());
	assert_eq!(hits[0].doc_id, "refrigerator:ice-maker-not-making-ice");
	assert_eq!(hits[0].source, SourceKind::Repair);
	assert_eq!(hits.iter().filter(|h| h.doc_id == "refrigerator:ice-maker-not-making-ice").count(), 1, "one hit per document");
	assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
	assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
}

#[tokio::test]
async fn source_filter_restricts_tags() {
	let tmp = tempfile::tempdir().unwrap();
	let store = build_store(tmp.path()).await;

	let hits = store.nearest_neighbors("ice maker refrigerator", 5, Some(&[SourceKind::Part][..])).await.expect("search");
	assert!(hits.iter().all(|h| h.source == SourceKind::Part));
	assert_eq!(hits.len(), 1);

	let none = store.nearest_neighbors("ice maker", 5, Some(&[][..])).await.expect("search");
	assert!(none.is_empty());

	let limited = store.nearest_neighbors("refrigerator dishwasher ice", 1, None).await.expect("search");
	assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn missing_table_is_a_connection_error() {
	let tmp = tempfile::tempdir().unwrap();
	let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
	let store = LanceSemanticStore::open(tmp.path(), "absent", embedder).await.expect("store");
	let err = store.nearest_neighbors("anything", 3, None).await.unwrap_err();
	assert!(matches!(err, AdapterError::Connection(_)));

	let conn = open_db(tmp.path().to_string_lossy().as_ref()).await.expect("db");
	assert_eq!(count_rows(&conn, "absent").await.expect("count"), 0);
}
