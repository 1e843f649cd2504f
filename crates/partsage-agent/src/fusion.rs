//! Merges structured and semantic results into one bounded context.
use std::collections::HashSet;

use partsage_core::types::{ContextItem, EntityKey, FusedContext, Provenance, SemanticHit};

/// Orders, deduplicates and truncates retrieval results.
///
/// Structured items keep the store's own order within a provenance tier, with
/// exact matches ahead of filtered and full-text results. Semantic hits follow
/// by descending score. When an entity appears more than once the
/// highest-ranked copy survives, so a structured record always wins over a
/// semantic snippet of the same entity. Truncation keeps the ranked prefix.
pub fn fuse(structured: Vec<(ContextItem, Provenance)>, semantic: Vec<SemanticHit>, max_items: usize) -> FusedContext {
    let mut structured = structured;
    // stable: ties keep native relevance order
    structured.sort_by_key(|(_, provenance)| provenance.tier());

    let mut semantic = semantic;
    semantic.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen: HashSet<EntityKey> = HashSet::new();
    let mut ordered: Vec<(ContextItem, Provenance)> = Vec::with_capacity(structured.len() + semantic.len());
    let candidates = structured
        .into_iter()
        .chain(semantic.into_iter().map(|hit| (ContextItem::Semantic(hit), Provenance::Semantic)));
    for (item, provenance) in candidates {
        if ordered.len() >= max_items { break; }
        if seen.insert(item.canonical_key()) {
            ordered.push((item, provenance));
        }
    }
    FusedContext::from_ordered(ordered)
}
