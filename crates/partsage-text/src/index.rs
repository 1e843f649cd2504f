use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tracing::info;

use partsage_core::catalog::Catalog;
use partsage_core::types::{CatalogRecord, RecordScope};

use crate::schema::{build_schema, register_tokenizer, CatalogFields};

pub(crate) const WRITER_HEAP_BYTES: usize = 50_000_000;
const DEFAULT_SCAN_LIMIT: usize = 2_000;

/// Handle to a catalog index. Cheap to clone; searches run on the blocking pool.
#[derive(Clone)]
pub struct CatalogIndex {
	pub(crate) inner: Arc<IndexInner>,
}

pub(crate) struct IndexInner {
	pub(crate) reader: IndexReader,
	pub(crate) index: Index,
	pub(crate) fields: CatalogFields,
	/// Upper bound on candidates examined by a filtered search before the
	/// in-memory price/keyword filters run.
	pub(crate) scan_limit: usize,
}

impl CatalogIndex {
	/// Builds an in-memory index, mostly for tests and one-shot tools.
	pub fn build_in_ram(catalog: &Catalog) -> Result<Self> {
		let index = Index::create_in_ram(build_schema());
		Self::populate(index, catalog)
	}

	/// Recreates the index directory from scratch and writes the catalog into it.
	pub fn create_in_dir(index_dir: &Path, catalog: &Catalog) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema()).with_context(|| format!("creating index in {}", index_dir.display()))?;
		Self::populate(index, catalog)
	}

	pub fn open_in_dir(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir).with_context(|| format!("opening index in {}", index_dir.display()))?;
		register_tokenizer(&index);
		Self::from_index(index)
	}

	pub fn with_scan_limit(self, scan_limit: usize) -> Self {
		let inner = match Arc::try_unwrap(self.inner) {
			Ok(mut inner) => { inner.scan_limit = scan_limit.max(1); inner }
			Err(shared) => IndexInner { reader: shared.reader.clone(), index: shared.index.clone(), fields: shared.fields, scan_limit: scan_limit.max(1) },
		};
		Self { inner: Arc::new(inner) }
	}

	fn populate(index: Index, catalog: &Catalog) -> Result<Self> {
		register_tokenizer(&index);
		let fields = CatalogFields::from_schema(&index.schema())?;
		let mut index_writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		let mut count = 0usize;
		let records = catalog.parts.iter().cloned().map(CatalogRecord::Part)
			.chain(catalog.compatibility.iter().cloned().map(CatalogRecord::Compatibility))
			.chain(catalog.repairs.iter().cloned().map(CatalogRecord::Repair))
			.chain(catalog.blogs.iter().cloned().map(CatalogRecord::Blog));
		for record in records {
			index_writer.add_document(to_document(&fields, &record)?)?;
			count += 1;
		}
		index_writer.commit()?;
		info!(documents = count, "catalog index committed");
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		let fields = CatalogFields::from_schema(&index.schema())?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { inner: Arc::new(IndexInner { reader, index, fields, scan_limit: DEFAULT_SCAN_LIMIT }) })
	}
}

fn to_document(fields: &CatalogFields, record: &CatalogRecord) -> Result<TantivyDocument> {
	let mut doc = TantivyDocument::default();
	doc.add_text(fields.key, record.canonical_key().as_str());
	doc.add_text(fields.scope, record.scope().as_str());
	doc.add_text(fields.payload, serde_json::to_string(record)?);
	match record {
		CatalogRecord::Part(p) => {
			if let Some(brand) = &p.brand { doc.add_text(fields.brand, brand.to_lowercase()); }
			if let Some(category) = &p.category { doc.add_text(fields.appliance_type, category.to_lowercase()); }
			let text = [
				Some(p.name.as_str()),
				Some(p.part_number.as_str()),
				p.description.as_deref(),
				p.brand.as_deref(),
				p.category.as_deref(),
				Some(p.symptoms.join(" ").as_str()),
			]
			.into_iter()
			.flatten()
			.collect::<Vec<_>>()
			.join(" ");
			doc.add_text(fields.text, text);
		}
		CatalogRecord::Compatibility(c) => {
			doc.add_text(fields.model_number, c.model_number.to_uppercase());
			if let Some(brand) = &c.brand { doc.add_text(fields.brand, brand.to_lowercase()); }
			if let Some(appliance) = &c.appliance_type { doc.add_text(fields.appliance_type, appliance.to_lowercase()); }
			doc.add_text(fields.text, format!("{} {} {}", c.part_name.as_deref().unwrap_or_default(), c.part_number, c.model_number));
		}
		CatalogRecord::Repair(r) => {
			doc.add_text(fields.appliance_type, r.appliance_type.to_lowercase());
			doc.add_text(fields.text, format!("{} {} {} {}", r.symptom, r.appliance_type, r.description.as_deref().unwrap_or_default(), r.parts_needed.join(" ")));
		}
		CatalogRecord::Blog(b) => {
			doc.add_text(fields.text, format!("{} {} {} {}", b.title, b.excerpt.as_deref().unwrap_or_default(), b.tags.join(" "), b.content.as_deref().unwrap_or_default()));
		}
	}
	Ok(doc)
}

/// Scopes a document may belong to, used by the stats listing.
pub const ALL_SCOPES: [RecordScope; 4] = [RecordScope::Parts, RecordScope::Compatibility, RecordScope::Repairs, RecordScope::Blogs];
