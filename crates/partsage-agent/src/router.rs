//! Chooses which store calls answer an intent and whether the semantic
//! fallback runs.
//!
//! Every store call carries its own timeout. A failed or timed-out call counts
//! as zero results. At most one semantic call is made per request.
use futures::future::join_all;
use futures::join;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use partsage_core::config::RetrievalSettings;
use partsage_core::error::{AdapterError, Retrieval};
use partsage_core::traits::{SemanticStore, StructuredStore};
use partsage_core::types::{
    CatalogRecord, ContextItem, Entities, ExactKey, FusedContext, Intent, IntentKind, Provenance, RecordScope, SearchCriteria,
    SemanticHit, SourceKind, TextScope,
};

use crate::classifier::duration_ms;
use crate::fusion::fuse;

const PART_SOURCES: &[SourceKind] = &[SourceKind::Part];
const REPAIR_SOURCES: &[SourceKind] = &[SourceKind::Repair, SourceKind::Blog];
const CONTENT_SOURCES: &[SourceKind] = &[SourceKind::Blog, SourceKind::Repair];

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub context: FusedContext,
    pub semantic_fallback: bool,
    /// Store calls that failed or timed out.
    pub failed_calls: usize,
}

impl RouteOutcome {
    fn empty() -> Self { Self { context: FusedContext::empty(), semantic_fallback: false, failed_calls: 0 } }
}

/// What the primary (structured) phase found and how the fallback should run.
struct Primary {
    items: Vec<(ContextItem, Provenance)>,
    failed: usize,
    /// Hits compared against `threshold` to decide on the fallback.
    signal: usize,
    threshold: usize,
    /// The fallback runs regardless of `signal`.
    force_fallback: bool,
    sources: &'static [SourceKind],
    /// Extra structured search issued alongside the fallback.
    widen: Option<SearchCriteria>,
}

impl Primary {
    fn new(threshold: usize, sources: &'static [SourceKind]) -> Self {
        Self { items: Vec::new(), failed: 0, signal: 0, threshold, force_fallback: false, sources, widen: None }
    }

    /// Appends found records with `provenance`; returns how many were added.
    fn absorb(&mut self, retrieval: Retrieval<CatalogRecord>, provenance: Provenance) -> usize {
        if matches!(retrieval, Retrieval::Failed(_)) { self.failed += 1; }
        let records = retrieval.into_items();
        let added = records.len();
        self.items.extend(records.into_iter().map(|r| (ContextItem::from(r), provenance)));
        added
    }
}

pub struct RetrievalRouter {
    structured: Arc<dyn StructuredStore>,
    semantic: Arc<dyn SemanticStore>,
    settings: RetrievalSettings,
}

impl RetrievalRouter {
    pub fn new(structured: Arc<dyn StructuredStore>, semantic: Arc<dyn SemanticStore>, settings: RetrievalSettings) -> Self {
        Self { structured, semantic, settings }
    }

    pub async fn route(&self, query_text: &str, intent: &Intent) -> RouteOutcome {
        let entities = &intent.entities;
        let primary = match intent.kind {
            IntentKind::OutOfScope => return RouteOutcome::empty(),
            IntentKind::PartLookup => self.part_lookup(query_text, entities).await,
            IntentKind::CompatibilityCheck => self.compatibility(entities).await,
            IntentKind::Troubleshooting => self.troubleshooting(query_text, entities).await,
            IntentKind::GeneralInfo => self.general_info(query_text, entities).await,
        };

        // Low-confidence intents search every source and need more evidence
        // before skipping the fallback.
        let low_confidence = intent.is_low_confidence(self.settings.low_confidence);
        let threshold = if low_confidence { primary.threshold.max(self.settings.troubleshooting_min_results) } else { primary.threshold };
        let needs_fallback = primary.force_fallback || primary.signal < threshold;
        let Primary { mut items, mut failed, widen, sources, signal, .. } = primary;

        let mut semantic_hits: Vec<SemanticHit> = Vec::new();
        if needs_fallback {
            let filter = if low_confidence { None } else { Some(sources) };
            info!(intent = %intent.kind, structured_hits = signal, threshold, widened = widen.is_some(), "semantic fallback");
            let widen_call = async {
                match widen {
                    Some(criteria) => self.filtered(criteria).await,
                    None => Retrieval::NoResults,
                }
            };
            let (widened, semantic) = join!(widen_call, self.semantic_search(query_text, filter));
            if matches!(widened, Retrieval::Failed(_)) { failed += 1; }
            items.extend(widened.into_items().into_iter().map(|r| (ContextItem::from(r), Provenance::Filtered)));
            if matches!(semantic, Retrieval::Failed(_)) { failed += 1; }
            semantic_hits = semantic.into_items();
        }

        let context = fuse(items, semantic_hits, self.settings.max_context_items);
        debug!(
            intent = %intent.kind,
            structured = context.structured_count(),
            semantic = context.semantic_count(),
            failed,
            "context fused"
        );
        RouteOutcome { context, semantic_fallback: needs_fallback, failed_calls: failed }
    }

    async fn part_lookup(&self, query_text: &str, e: &Entities) -> Primary {
        let mut primary = Primary::new(self.settings.fallback_threshold, PART_SOURCES);
        if !e.part_numbers.is_empty() {
            let lookups = e.part_numbers.iter().take(self.settings.max_exact_lookups).map(|pn| self.exact(ExactKey::Part(pn.clone())));
            for found in join_all(lookups).await {
                let added = primary.absorb(found, Provenance::ExactMatch);
                primary.signal += added;
            }
        } else if e.brand.is_some() || e.category.is_some() || e.appliance_type.is_some() || e.has_price_bound() {
            let found = self.filtered(part_criteria(e)).await;
            primary.signal = primary.absorb(found, Provenance::Filtered);
        } else {
            let scope = TextScope { scope: RecordScope::Parts, appliance_type: e.appliance_type.clone() };
            let found = self.full_text(query_text, scope).await;
            primary.signal = primary.absorb(found, Provenance::FullText);
        }
        primary
    }

    async fn compatibility(&self, e: &Entities) -> Primary {
        let mut primary = Primary::new(self.settings.fallback_threshold, PART_SOURCES);
        let model_found = match (e.part_number(), e.model_number()) {
            (Some(part), Some(model)) => {
                let edge_key = ExactKey::Compatibility { part_number: part.to_string(), model_number: model.to_string() };
                let (edge, record) = join!(self.exact(edge_key), self.exact(ExactKey::Part(part.to_string())));
                let edges = primary.absorb(edge, Provenance::ExactMatch);
                let parts = primary.absorb(record, Provenance::ExactMatch);
                primary.signal = edges + parts;
                edges > 0
            }
            (None, Some(model)) => {
                let mut criteria = SearchCriteria::new(RecordScope::Compatibility);
                criteria.model_number = Some(model.to_string());
                let edges = self.filtered(criteria).await;
                let found = primary.absorb(edges, Provenance::Filtered);
                primary.signal = found;
                found > 0
            }
            (Some(part), None) => {
                let record = self.exact(ExactKey::Part(part.to_string())).await;
                primary.signal = primary.absorb(record, Provenance::ExactMatch);
                true
            }
            (None, None) => false,
        };
        if !model_found {
            primary.force_fallback = true;
            if e.brand.is_some() || e.appliance_type.is_some() {
                let mut criteria = SearchCriteria::new(RecordScope::Parts);
                criteria.brand = e.brand.clone();
                criteria.appliance_type = e.appliance_type.clone();
                criteria.category = e.category.clone();
                primary.widen = Some(criteria);
            }
        }
        primary
    }

    async fn troubleshooting(&self, query_text: &str, e: &Entities) -> Primary {
        let mut primary = Primary::new(self.settings.troubleshooting_min_results, REPAIR_SOURCES);
        let repair_scope = TextScope { scope: RecordScope::Repairs, appliance_type: e.appliance_type.clone() };
        let part_scope = TextScope { scope: RecordScope::Parts, appliance_type: e.appliance_type.clone() };
        let keyword = e.category.clone().or_else(|| e.symptoms.first().cloned());
        let keyword_search = async {
            match keyword {
                Some(keyword) => {
                    let mut criteria = SearchCriteria::new(RecordScope::Repairs);
                    criteria.appliance_type = e.appliance_type.clone();
                    criteria.keyword = Some(keyword);
                    self.filtered(criteria).await
                }
                None => Retrieval::NoResults,
            }
        };
        let (text_repairs, keyword_repairs, parts) =
            join!(self.full_text(query_text, repair_scope), keyword_search, self.full_text(query_text, part_scope));

        let mut repair_keys = HashSet::new();
        for retrieval in [&text_repairs, &keyword_repairs] {
            if let Retrieval::Found(records) = retrieval {
                repair_keys.extend(records.iter().map(CatalogRecord::canonical_key));
            }
        }
        primary.signal = repair_keys.len();
        primary.absorb(text_repairs, Provenance::FullText);
        primary.absorb(keyword_repairs, Provenance::Filtered);
        primary.absorb(parts, Provenance::FullText);
        primary
    }

    async fn general_info(&self, query_text: &str, e: &Entities) -> Primary {
        let mut primary = Primary::new(self.settings.fallback_threshold, CONTENT_SOURCES);
        let lookups = e.part_numbers.iter().take(self.settings.max_exact_lookups).map(|pn| self.exact(ExactKey::Part(pn.clone())));
        let (parts, blogs) = join!(join_all(lookups), self.full_text(query_text, TextScope::new(RecordScope::Blogs)));
        for found in parts {
            let added = primary.absorb(found, Provenance::ExactMatch);
            primary.signal += added;
        }
        let added = primary.absorb(blogs, Provenance::FullText);
        primary.signal += added;
        primary
    }

    async fn exact(&self, key: ExactKey) -> Retrieval<CatalogRecord> {
        let call = async { self.structured.lookup_by_exact_key(&key).await.map(|found| found.into_iter().collect::<Vec<_>>()) };
        self.guarded("exact_lookup", self.settings.structured_timeout(), call).await
    }

    async fn filtered(&self, criteria: SearchCriteria) -> Retrieval<CatalogRecord> {
        let limit = self.settings.structured_limit;
        let call = async { self.structured.filtered_search(&criteria, limit).await };
        self.guarded("filtered_search", self.settings.structured_timeout(), call).await
    }

    async fn full_text(&self, text: &str, scope: TextScope) -> Retrieval<CatalogRecord> {
        let limit = self.settings.structured_limit;
        let call = async { self.structured.full_text_search(text, &scope, limit).await };
        self.guarded("full_text_search", self.settings.structured_timeout(), call).await
    }

    async fn semantic_search(&self, text: &str, filter: Option<&[SourceKind]>) -> Retrieval<SemanticHit> {
        let k = self.settings.semantic_k;
        let call = async { self.semantic.nearest_neighbors(text, k, filter).await };
        self.guarded("nearest_neighbors", self.settings.semantic_timeout(), call).await
    }

    async fn guarded<T, F>(&self, op: &'static str, budget: Duration, call: F) -> Retrieval<T>
    where
        F: Future<Output = Result<Vec<T>, AdapterError>>,
    {
        let started = Instant::now();
        let result = match timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout { timeout_ms: duration_ms(budget) }),
        };
        let retrieval = Retrieval::from_result(result);
        let elapsed_ms = duration_ms(started.elapsed());
        match &retrieval {
            Retrieval::Failed(e) => warn!(op, error = %e, elapsed_ms, "store call failed, treating as no results"),
            other => debug!(op, hits = other.len(), elapsed_ms, "store call"),
        }
        retrieval
    }
}

fn part_criteria(e: &Entities) -> SearchCriteria {
    let mut criteria = SearchCriteria::new(RecordScope::Parts);
    criteria.brand = e.brand.clone();
    criteria.category = e.category.clone();
    criteria.appliance_type = e.appliance_type.clone();
    criteria.min_price = e.min_price;
    criteria.max_price = e.max_price;
    criteria
}
