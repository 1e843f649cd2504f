//! Text embedders: BGE-M3 on candle for real runs, a hashing embedder for
//! tests and machines without the model files.
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use partsage_core::config::EmbeddingSettings;
use partsage_core::traits::Embedder;

pub mod device;
pub mod hashed;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hashed::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `embedding.use_fake`) selects the hashing
/// embedder; otherwise the model is loaded from disk.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if settings.use_fake || env_fake {
        info!(dim = settings.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    let model_dir = model::resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(BgeM3Embedder::load(&model_dir, settings.max_len)?))
}
