//! LanceDB chunk table: schema, writer and the semantic store over it.
pub mod schema;
pub mod store;
pub mod table;
pub mod writer;

pub use store::LanceSemanticStore;
pub use writer::ChunkWriter;
