use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use partsage_core::error::AdapterError;
use partsage_core::traits::{Embedder, SemanticStore};
use partsage_core::types::{SemanticHit, SourceKind};

use crate::table::open_db;

/// Extra candidates fetched per requested hit, since several chunks of the
/// same document can crowd the top of the list.
const OVERFETCH: usize = 3;

/// Cosine nearest-neighbour search over the chunk table.
pub struct LanceSemanticStore {
	db: Connection,
	table_name: String,
	embedder: Arc<dyn Embedder>,
}

impl LanceSemanticStore {
	pub async fn open(db_path: &Path, table_name: &str, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db, table_name: table_name.to_string(), embedder })
	}

	async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
		let embedder = Arc::clone(&self.embedder);
		let texts = vec![text.to_string()];
		let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
			.await
			.map_err(|e| AdapterError::Connection(format!("embedding task failed: {e}")))?
			.map_err(|e| AdapterError::Connection(format!("embedding failed: {e}")))?;
		vectors.pop().ok_or_else(|| AdapterError::Connection("embedder returned no vector".into()))
	}
}

#[async_trait]
impl SemanticStore for LanceSemanticStore {
	async fn nearest_neighbors(&self, text: &str, k: usize, source_filter: Option<&[SourceKind]>) -> Result<Vec<SemanticHit>, AdapterError> {
		if k == 0 || text.trim().is_empty() { return Ok(Vec::new()); }
		if matches!(source_filter, Some(kinds) if kinds.is_empty()) { return Ok(Vec::new()); }

		let query_vec = self.embed_query(text).await?;
		let table = self.db.open_table(&self.table_name).execute().await.map_err(lance_err)?;
		let mut query = table
			.vector_search(query_vec)
			.map_err(|e| AdapterError::QueryMalformed(e.to_string()))?
			.distance_type(DistanceType::Cosine)
			.limit(k * OVERFETCH);
		if let Some(kinds) = source_filter {
			query = query.only_if(source_predicate(kinds));
		}
		let mut stream = query.execute().await.map_err(lance_err)?;

		let mut best: HashMap<(SourceKind, String), SemanticHit> = HashMap::new();
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
			for hit in hits_from_batch(&batch)? {
				let key = (hit.source, hit.doc_id.clone());
				let better = best.get(&key).map_or(true, |existing| hit.score > existing.score);
				if better { best.insert(key, hit); }
			}
		}
		let mut hits: Vec<SemanticHit> = best.into_values().collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
		hits.truncate(k);
		debug!(k, hits = hits.len(), "semantic search");
		Ok(hits)
	}
}

fn lance_err(e: lancedb::Error) -> AdapterError { AdapterError::Connection(e.to_string()) }

fn source_predicate(kinds: &[SourceKind]) -> String {
	let tags: Vec<String> = kinds.iter().map(|k| format!("'{}'", k.as_str())).collect();
	format!("source_type IN ({})", tags.join(", "))
}

/// Cosine distance is in [0, 2]; similarity is reported as `1 - d` clamped to [0, 1].
pub fn similarity_from_distance(distance: f32) -> f32 { (1.0 - distance).clamp(0.0, 1.0) }

fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<SemanticHit>, AdapterError> {
	let doc_ids = string_col(batch, "doc_id")?;
	let sources = string_col(batch, "source_type")?;
	let titles = string_col(batch, "title")?;
	let urls = string_col(batch, "url")?;
	let contents = string_col(batch, "content")?;
	let distances = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| AdapterError::Connection("result batch has no _distance column".into()))?;

	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let Some(source) = SourceKind::parse(sources.value(i)) else { continue };
		let title = titles.value(i);
		hits.push(SemanticHit {
			doc_id: doc_ids.value(i).to_string(),
			chunk: contents.value(i).to_string(),
			score: similarity_from_distance(distances.value(i)),
			source,
			title: (!title.is_empty()).then(|| title.to_string()),
			url: (!urls.is_null(i)).then(|| urls.value(i).to_string()),
		});
	}
	Ok(hits)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, AdapterError> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| AdapterError::Connection(format!("result batch has no {name} column")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn similarity_is_clamped() {
		assert_eq!(similarity_from_distance(0.0), 1.0);
		assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-6);
		assert_eq!(similarity_from_distance(1.6), 0.0);
	}

	#[test]
	fn predicate_lists_source_tags() {
		assert_eq!(source_predicate(&[SourceKind::Part, SourceKind::Blog]), "source_type IN ('part', 'blog')");
	}
}
