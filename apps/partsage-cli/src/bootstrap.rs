//! Wires the concrete stores and the chat client into an `Assistant`, and
//! rebuilds both indexes from the catalog export.
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use partsage_agent::Assistant;
use partsage_core::catalog::CatalogLoader;
use partsage_core::config::{resolve_with_base, Settings};
use partsage_core::types::RecordScope;
use partsage_embed::get_default_embedder;
use partsage_llm::ChatClient;
use partsage_text::{CatalogIndex, PriceRange};
use partsage_vector::{ChunkWriter, LanceSemanticStore};

#[derive(Debug, Clone)]
pub struct Paths {
    pub catalog_dir: PathBuf,
    pub text_index_dir: PathBuf,
    pub vector_db_dir: PathBuf,
}

impl Paths {
    /// Relative paths resolve against the working directory.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        let base = std::env::current_dir().context("reading working directory")?;
        Ok(Self::resolve_with(&base, settings))
    }

    pub fn resolve_with(base: &Path, settings: &Settings) -> Self {
        Self {
            catalog_dir: resolve_with_base(base, &settings.data.catalog_dir),
            text_index_dir: resolve_with_base(base, &settings.data.text_index_dir),
            vector_db_dir: resolve_with_base(base, &settings.data.vector_db_dir),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub parts: usize,
    pub compatibility: usize,
    pub repairs: usize,
    pub blogs: usize,
    pub chunks: usize,
    pub vectors_written: usize,
    pub index_stats: Vec<(RecordScope, usize)>,
}

pub async fn build_assistant(settings: &Settings, paths: &Paths) -> Result<Assistant> {
    let index = CatalogIndex::open_in_dir(&paths.text_index_dir)?.with_scan_limit(settings.retrieval.filter_scan_limit);
    let embedder = get_default_embedder(&settings.embedding)?;
    let semantic = LanceSemanticStore::open(&paths.vector_db_dir, &settings.data.vector_table, embedder).await?;
    let llm = ChatClient::new(&settings.llm).context("building chat client")?;
    if settings.llm.api_key.trim().is_empty() {
        tracing::warn!("llm.api_key is empty, answers will come from the rule classifier and context listings");
    }
    Ok(Assistant::new(Arc::new(index), Arc::new(semantic), Arc::new(llm), settings))
}

/// Loads the catalog from `catalog_dir` and recreates the text index and,
/// unless skipped, the vector table.
pub async fn ingest(settings: &Settings, paths: &Paths, catalog_dir: Option<&Path>, skip_vectors: bool) -> Result<IngestReport> {
    let catalog_dir = catalog_dir.map_or_else(|| paths.catalog_dir.clone(), Path::to_path_buf);
    let loader = CatalogLoader::new();
    let catalog = loader.load_directory(&catalog_dir)?;
    if catalog.is_empty() {
        bail!("no catalog records found under {}", catalog_dir.display());
    }

    let index_dir = paths.text_index_dir.clone();
    let for_index = catalog.clone();
    let index = tokio::task::spawn_blocking(move || CatalogIndex::create_in_dir(&index_dir, &for_index)).await??;
    let index_stats = index.stats()?;
    info!(dir = %paths.text_index_dir.display(), "text index rebuilt");

    let chunks = loader.chunk_catalog(&catalog);
    let vectors_written = if skip_vectors {
        0
    } else {
        let embedder = get_default_embedder(&settings.embedding)?;
        let writer = ChunkWriter::recreate(&paths.vector_db_dir, &settings.data.vector_table, embedder.dim()).await?;
        writer.index_chunks(&chunks, embedder).await?
    };

    Ok(IngestReport {
        parts: catalog.parts.len(),
        compatibility: catalog.compatibility.len(),
        repairs: catalog.repairs.len(),
        blogs: catalog.blogs.len(),
        chunks: chunks.len(),
        vectors_written,
        index_stats,
    })
}

pub fn index_stats(paths: &Paths) -> Result<Vec<(RecordScope, usize)>> {
    CatalogIndex::open_in_dir(&paths.text_index_dir)?.stats()
}

#[derive(Debug, Clone)]
pub struct CatalogSummary {
    pub counts: Vec<(RecordScope, usize)>,
    pub brands: Vec<String>,
    pub price_range: Option<PriceRange>,
}

/// Counts, brands and the part price range, optionally for one appliance type.
pub fn catalog_summary(paths: &Paths, appliance_type: Option<&str>) -> Result<CatalogSummary> {
    let index = CatalogIndex::open_in_dir(&paths.text_index_dir)?;
    Ok(CatalogSummary {
        counts: index.stats()?,
        brands: index.brands(appliance_type)?,
        price_range: index.price_range(appliance_type)?,
    })
}
