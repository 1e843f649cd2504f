use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const CATALOG_TOKENIZER: &str = "catalog_text";

#[derive(Debug, Clone, Copy)]
pub struct CatalogFields {
	pub key: Field,
	pub scope: Field,
	pub model_number: Field,
	pub brand: Field,
	pub appliance_type: Field,
	pub text: Field,
	pub payload: Field,
}

impl CatalogFields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			key: schema.get_field("key")?,
			scope: schema.get_field("scope")?,
			model_number: schema.get_field("model_number")?,
			brand: schema.get_field("brand")?,
			appliance_type: schema.get_field("appliance_type")?,
			text: schema.get_field("text")?,
			payload: schema.get_field("payload")?,
		})
	}
}

/// `key`, `scope`, `model_number`, `brand` and `appliance_type` are raw
/// (untokenized, lower- or upper-cased on write) so they can be matched exactly.
/// `payload` holds the serialized record.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("key", STRING | STORED);
	schema_builder.add_text_field("scope", STRING);
	schema_builder.add_text_field("model_number", STRING);
	schema_builder.add_text_field("brand", STRING);
	schema_builder.add_text_field("appliance_type", STRING);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(CATALOG_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_text_field("payload", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","in","is","it","its","of","on","that","the","to","was","will","with","or","but","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","can","could","should","would","may","might","must","do","does","did","have","had","my","me","i","you","your",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(CATALOG_TOKENIZER, tokenizer);
}
