//! Embeds catalog chunks and writes them to the chunk table.
use anyhow::{bail, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use partsage_core::traits::Embedder;
use partsage_core::types::EmbeddingChunk;

use crate::schema::build_arrow_schema;
use crate::table::{open_db, table_exists};

const EMBED_BATCH: usize = 64;
const INSERT_BATCH: usize = 1000;

pub struct ChunkWriter {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl ChunkWriter {
	pub async fn new(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	/// Removes the database directory first so a rebuild never mixes old and
	/// new chunks.
	pub async fn recreate(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
		if db_path.exists() { std::fs::remove_dir_all(db_path)?; }
		std::fs::create_dir_all(db_path)?;
		Self::new(db_path, table_name, dim).await
	}

	/// Embeds and writes `chunks`, returning how many rows were written.
	pub async fn index_chunks(&self, chunks: &[EmbeddingChunk], embedder: Arc<dyn Embedder>) -> Result<usize> {
		if chunks.is_empty() { info!("no chunks to index"); return Ok(0); }
		if embedder.dim() != self.dim { bail!("embedder dim {} does not match table dim {}", embedder.dim(), self.dim); }
		info!(chunks = chunks.len(), table = %self.table_name, "indexing chunks");
		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));

		let mut pending: Vec<(&EmbeddingChunk, Vec<f32>)> = Vec::with_capacity(INSERT_BATCH);
		let mut written = 0usize;
		for batch in chunks.chunks(EMBED_BATCH) {
			let texts: Vec<String> = batch.iter().map(|c| format!("{}\n{}", c.title, c.content)).collect();
			let embedder = Arc::clone(&embedder);
			let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await??;
			if vectors.len() != batch.len() { bail!("embedder returned {} vectors for {} chunks", vectors.len(), batch.len()); }
			pending.extend(batch.iter().zip(vectors));
			pb.inc(batch.len() as u64);
			if pending.len() >= INSERT_BATCH {
				written += self.insert_batch(&pending).await?;
				pending.clear();
			}
		}
		written += self.insert_batch(&pending).await?;
		pb.finish_with_message("done");
		info!(rows = written, table = %self.table_name, "chunk table written");
		Ok(written)
	}

	async fn insert_batch(&self, rows: &[(&EmbeddingChunk, Vec<f32>)]) -> Result<usize> {
		if rows.is_empty() { return Ok(0); }
		let record_batch = self.rows_to_record_batch(rows)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if table_exists(&self.db, &self.table_name).await? {
			self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await?;
		}
		Ok(rows.len())
	}

	fn rows_to_record_batch(&self, rows: &[(&EmbeddingChunk, Vec<f32>)]) -> Result<RecordBatch> {
		let dim = i32::try_from(self.dim)?;
		let schema = build_arrow_schema(dim);
		let mut ids = Vec::new(); let mut doc_ids = Vec::new(); let mut sources = Vec::new(); let mut titles = Vec::new(); let mut urls = Vec::new();
		let mut contents = Vec::new(); let mut chunk_indices = Vec::new(); let mut total_chunks = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for (chunk, vector) in rows {
			if vector.len() != self.dim { bail!("chunk {} has a {}-dim vector, expected {}", chunk.id, vector.len(), self.dim); }
			ids.push(chunk.id.clone()); doc_ids.push(chunk.doc_id.clone()); sources.push(chunk.source.as_str()); titles.push(chunk.title.clone()); urls.push(chunk.url.clone());
			contents.push(chunk.content.clone()); chunk_indices.push(i32::try_from(chunk.chunk_index)?); total_chunks.push(i32::try_from(chunk.total_chunks)?);
			vectors.push(Some(vector.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(doc_ids)),
			Arc::new(StringArray::from(sources)),
			Arc::new(StringArray::from(titles)),
			Arc::new(StringArray::from(urls)),
			Arc::new(StringArray::from(contents)),
			Arc::new(Int32Array::from(chunk_indices)),
			Arc::new(Int32Array::from(total_chunks)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
		])?;
		Ok(record_batch)
	}
}
