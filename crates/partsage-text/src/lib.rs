//! partsage-text
//!
//! Tantivy-backed structured store over the parts catalog: exact key lookups,
//! AND-combined filters and BM25 full-text search. See `index` for building and
//! `store` for the query side.
pub mod index;
pub mod schema;
pub mod store;

pub use index::CatalogIndex;
pub use store::PriceRange;
