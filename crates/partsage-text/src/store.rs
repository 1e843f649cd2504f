use async_trait::async_trait;
use std::sync::Arc;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use std::collections::BTreeMap;
use tantivy::{DocAddress, Searcher, TantivyDocument, Term};
use tracing::debug;

use partsage_core::error::AdapterError;
use partsage_core::traits::StructuredStore;
use partsage_core::types::{CatalogRecord, EntityKey, ExactKey, PartRecord, RecordScope, SearchCriteria, TextScope};

use crate::index::{CatalogIndex, IndexInner, ALL_SCOPES};

impl CatalogIndex {
	/// Document counts per scope, in `ALL_SCOPES` order.
	pub fn stats(&self) -> anyhow::Result<Vec<(RecordScope, usize)>> {
		let searcher = self.inner.reader.searcher();
		let mut counts = Vec::with_capacity(ALL_SCOPES.len());
		for scope in ALL_SCOPES {
			counts.push((scope, searcher.search(&term_query(self.inner.fields.scope, scope.as_str()), &Count)?));
		}
		Ok(counts)
	}

	/// Distinct part brands, sorted, optionally limited to one appliance type.
	pub fn brands(&self, appliance_type: Option<&str>) -> anyhow::Result<Vec<String>> {
		let mut by_key: BTreeMap<String, String> = BTreeMap::new();
		for part in self.parts(appliance_type)? {
			if let Some(brand) = part.brand.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()) {
				by_key.entry(brand.to_lowercase()).or_insert(brand);
			}
		}
		Ok(by_key.into_values().collect())
	}

	/// Lowest and highest part price. `None` when no part carries a price.
	pub fn price_range(&self, appliance_type: Option<&str>) -> anyhow::Result<Option<PriceRange>> {
		let range = self.parts(appliance_type)?.iter().filter_map(|p| p.price).fold(None, |range: Option<PriceRange>, price| {
			Some(match range {
				Some(r) => PriceRange { min: r.min.min(price), max: r.max.max(price) },
				None => PriceRange { min: price, max: price },
			})
		});
		Ok(range)
	}

	fn parts(&self, appliance_type: Option<&str>) -> anyhow::Result<Vec<PartRecord>> {
		let searcher = self.inner.reader.searcher();
		let fields = &self.inner.fields;
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, Box::new(term_query(fields.scope, RecordScope::Parts.as_str())))];
		if let Some(appliance) = appliance_type {
			clauses.push((Occur::Must, Box::new(term_query(fields.appliance_type, &appliance.trim().to_lowercase()))));
		}
		let addresses = searcher.search(&BooleanQuery::new(clauses), &DocSetCollector)?;
		let mut parts = Vec::with_capacity(addresses.len());
		for address in addresses {
			if let CatalogRecord::Part(part) = load_record(&searcher, &self.inner, address)? {
				parts.push(part);
			}
		}
		Ok(parts)
	}

	async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, AdapterError>
	where
		T: Send + 'static,
		F: FnOnce(&IndexInner) -> Result<T, AdapterError> + Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		tokio::task::spawn_blocking(move || f(&inner))
			.await
			.map_err(|e| AdapterError::Connection(format!("{op} task failed: {e}")))?
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
	pub min: f64,
	pub max: f64,
}

#[async_trait]
impl StructuredStore for CatalogIndex {
	async fn lookup_by_exact_key(&self, key: &ExactKey) -> Result<Option<CatalogRecord>, AdapterError> {
		let entity_key = match key {
			ExactKey::Part(part_number) => EntityKey::part(part_number),
			ExactKey::Compatibility { part_number, model_number } => EntityKey::compatibility(part_number, model_number),
		};
		self.run_blocking("lookup", move |inner| {
			let searcher = inner.reader.searcher();
			let query = term_query(inner.fields.key, entity_key.as_str());
			let top = searcher.search(&query, &TopDocs::with_limit(1)).map_err(store_err)?;
			match top.into_iter().next() {
				Some((_, address)) => Ok(Some(load_record(&searcher, inner, address)?)),
				None => Ok(None),
			}
		})
		.await
	}

	async fn filtered_search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError> {
		if let (Some(min), Some(max)) = (criteria.min_price, criteria.max_price) {
			if min > max {
				return Err(AdapterError::QueryMalformed(format!("min_price {min} exceeds max_price {max}")));
			}
		}
		let criteria = criteria.clone();
		self.run_blocking("filtered_search", move |inner| {
			let searcher = inner.reader.searcher();
			let fields = &inner.fields;
			let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, Box::new(term_query(fields.scope, criteria.scope.as_str())))];
			if let Some(brand) = &criteria.brand {
				clauses.push((Occur::Must, Box::new(term_query(fields.brand, &brand.trim().to_lowercase()))));
			}
			if let Some(appliance) = &criteria.appliance_type {
				clauses.push((Occur::Must, Box::new(term_query(fields.appliance_type, &appliance.trim().to_lowercase()))));
			}
			if let Some(model) = &criteria.model_number {
				clauses.push((Occur::Must, Box::new(term_query(fields.model_number, &model.trim().to_uppercase()))));
			}
			let query = BooleanQuery::new(clauses);
			let mut addresses: Vec<DocAddress> = searcher.search(&query, &DocSetCollector).map_err(store_err)?.into_iter().collect();
			addresses.sort();

			let mut records = Vec::new();
			for address in addresses.into_iter().take(inner.scan_limit) {
				let record = load_record(&searcher, inner, address)?;
				if matches_in_memory(&record, &criteria) {
					records.push(record);
					if records.len() >= limit { break; }
				}
			}
			debug!(scope = criteria.scope.as_str(), hits = records.len(), "filtered search");
			Ok(records)
		})
		.await
	}

	async fn full_text_search(&self, text: &str, scope: &TextScope, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError> {
		if text.trim().is_empty() || limit == 0 {
			return Ok(Vec::new());
		}
		let text = text.to_string();
		let scope = scope.clone();
		self.run_blocking("full_text_search", move |inner| {
			let searcher = inner.reader.searcher();
			let fields = &inner.fields;
			let query_parser = QueryParser::for_index(&inner.index, vec![fields.text]);
			// Free text from users routinely contains stray quotes and colons.
			let (text_query, _errors) = query_parser.parse_query_lenient(&text);
			let mut clauses: Vec<(Occur, Box<dyn Query>)> =
				vec![(Occur::Must, text_query), (Occur::Must, Box::new(term_query(fields.scope, scope.scope.as_str())))];
			if let Some(appliance) = &scope.appliance_type {
				clauses.push((Occur::Must, Box::new(term_query(fields.appliance_type, &appliance.trim().to_lowercase()))));
			}
			let query = BooleanQuery::new(clauses);
			let top_docs = searcher.search(&query, &TopDocs::with_limit(limit)).map_err(store_err)?;
			let mut records = Vec::with_capacity(top_docs.len());
			for (_score, address) in top_docs {
				records.push(load_record(&searcher, inner, address)?);
			}
			Ok(records)
		})
		.await
	}

	async fn count(&self, scope: RecordScope) -> Result<usize, AdapterError> {
		self.run_blocking("count", move |inner| {
			let searcher = inner.reader.searcher();
			searcher.search(&term_query(inner.fields.scope, scope.as_str()), &Count).map_err(store_err)
		})
		.await
	}
}

fn term_query(field: Field, value: &str) -> TermQuery {
	TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic)
}

fn store_err(e: tantivy::TantivyError) -> AdapterError { AdapterError::Connection(e.to_string()) }

fn load_record(searcher: &Searcher, inner: &IndexInner, address: DocAddress) -> Result<CatalogRecord, AdapterError> {
	let doc: TantivyDocument = searcher.doc(address).map_err(store_err)?;
	let payload = doc
		.get_first(inner.fields.payload)
		.and_then(|v| v.as_str())
		.ok_or_else(|| AdapterError::Connection("indexed document has no payload".into()))?;
	serde_json::from_str(payload).map_err(|e| AdapterError::Connection(format!("corrupt payload: {e}")))
}

/// Filters the term index cannot express: price bounds, category and keyword.
fn matches_in_memory(record: &CatalogRecord, criteria: &SearchCriteria) -> bool {
	if criteria.min_price.is_some() || criteria.max_price.is_some() {
		let price = match record {
			CatalogRecord::Part(p) => p.price,
			CatalogRecord::Compatibility(c) => c.price,
			CatalogRecord::Repair(_) | CatalogRecord::Blog(_) => None,
		};
		let Some(price) = price else { return false };
		if criteria.min_price.is_some_and(|min| price < min) || criteria.max_price.is_some_and(|max| price > max) {
			return false;
		}
	}
	if let Some(category) = &criteria.category {
		let haystack = match record {
			CatalogRecord::Part(p) => p.name.clone(),
			CatalogRecord::Compatibility(c) => c.part_name.clone().unwrap_or_default(),
			CatalogRecord::Repair(r) => r.parts_needed.join(" "),
			CatalogRecord::Blog(b) => format!("{} {}", b.title, b.tags.join(" ")),
		};
		if !contains_ci(&haystack, category) { return false; }
	}
	if let Some(keyword) = &criteria.keyword {
		let haystack = match record {
			CatalogRecord::Part(p) => format!("{} {} {}", p.name, p.description.as_deref().unwrap_or_default(), p.symptoms.join(" ")),
			CatalogRecord::Compatibility(c) => c.part_name.clone().unwrap_or_default(),
			CatalogRecord::Repair(r) => format!("{} {}", r.symptom, r.description.as_deref().unwrap_or_default()),
			CatalogRecord::Blog(b) => format!("{} {}", b.title, b.excerpt.as_deref().unwrap_or_default()),
		};
		if !contains_ci(&haystack, keyword) { return false; }
	}
	true
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
	let needle = needle.trim().to_lowercase();
	needle.is_empty() || haystack.to_lowercase().contains(&needle)
}
