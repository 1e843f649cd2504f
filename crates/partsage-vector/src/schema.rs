use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Chunk table layout. `source_type` holds the `SourceKind` tag and is what
/// source filters are pushed down on.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("source_type", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("url", DataType::Utf8, true),
		Field::new("content", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("total_chunks", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
