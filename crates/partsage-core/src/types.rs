//! Domain types used by the adapters and the orchestration core.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ThreadId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior message in a conversation, oldest first in any history slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    PartLookup,
    CompatibilityCheck,
    Troubleshooting,
    GeneralInfo,
    OutOfScope,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PartLookup => "part_lookup",
            Self::CompatibilityCheck => "compatibility_check",
            Self::Troubleshooting => "troubleshooting",
            Self::GeneralInfo => "general_info",
            Self::OutOfScope => "out_of_scope",
        }
    }

    /// Parses a label emitted by the classifier model. Accepts a few synonyms
    /// models tend to produce in place of the canonical labels.
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "part_lookup" | "part_search" | "specific_part" | "installation_help" => Some(Self::PartLookup),
            "compatibility_check" | "compatibility" => Some(Self::CompatibilityCheck),
            "troubleshooting" | "repair" | "symptom" => Some(Self::Troubleshooting),
            "general_info" | "educational" | "general" => Some(Self::GeneralInfo),
            "out_of_scope" | "off_topic" => Some(Self::OutOfScope),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Entity slots extracted from a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    #[serde(default)]
    pub part_numbers: Vec<String>,
    #[serde(default)]
    pub model_numbers: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Part category such as "water filter" or "door gasket".
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub appliance_type: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Set when `part_numbers` was filled from an earlier turn rather than the
    /// current query.
    #[serde(default)]
    pub part_from_history: bool,
}

impl Entities {
    pub fn part_number(&self) -> Option<&str> { self.part_numbers.first().map(String::as_str) }
    pub fn model_number(&self) -> Option<&str> { self.model_numbers.first().map(String::as_str) }
    pub fn has_price_bound(&self) -> bool { self.min_price.is_some() || self.max_price.is_some() }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    Model,
    Rules,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: Entities,
    pub confidence: f32,
    pub source: IntentSource,
}

impl Intent {
    pub fn is_low_confidence(&self, threshold: f32) -> bool { self.confidence < threshold }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Installation {
    pub difficulty: Option<String>,
    pub time: Option<String>,
    pub video_url: Option<String>,
    pub guide_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartRecord {
    pub part_number: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub manufacturer_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub installation: Installation,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub compatible_models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityEdge {
    pub part_number: String,
    pub model_number: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub appliance_type: Option<String>,
    /// Denormalized from the part so a model-only lookup can list parts.
    #[serde(default)]
    pub part_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub product_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepairGuide {
    pub id: String,
    pub appliance_type: String,
    pub symptom: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub percentage_reported: Option<f32>,
    #[serde(default)]
    pub parts_needed: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub detail_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BlogExcerpt {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A record as returned by the structured store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogRecord {
    Part(PartRecord),
    Compatibility(CompatibilityEdge),
    Repair(RepairGuide),
    Blog(BlogExcerpt),
}

impl CatalogRecord {
    pub fn canonical_key(&self) -> EntityKey {
        match self {
            Self::Part(p) => EntityKey::part(&p.part_number),
            Self::Compatibility(c) => EntityKey::compatibility(&c.part_number, &c.model_number),
            Self::Repair(r) => EntityKey::repair(&r.id),
            Self::Blog(b) => EntityKey::blog(&b.url),
        }
    }

    pub fn scope(&self) -> RecordScope {
        match self {
            Self::Part(_) => RecordScope::Parts,
            Self::Compatibility(_) => RecordScope::Compatibility,
            Self::Repair(_) => RecordScope::Repairs,
            Self::Blog(_) => RecordScope::Blogs,
        }
    }
}

/// Canonical identity of a catalog entity, shared by both stores so results
/// for the same entity can be recognised across them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn part(part_number: &str) -> Self { Self(format!("part:{}", part_number.trim().to_ascii_uppercase())) }
    pub fn compatibility(part_number: &str, model_number: &str) -> Self {
        Self(format!("compat:{}:{}", part_number.trim().to_ascii_uppercase(), model_number.trim().to_ascii_uppercase()))
    }
    pub fn repair(id: &str) -> Self { Self(format!("repair:{}", id.trim())) }
    pub fn blog(url: &str) -> Self { Self(format!("blog:{}", url.trim().trim_end_matches('/'))) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ---------------------------------------------------------------------------
// Structured store query surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordScope {
    Parts,
    Compatibility,
    Repairs,
    Blogs,
}

impl RecordScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parts => "parts",
            Self::Compatibility => "compatibility",
            Self::Repairs => "repairs",
            Self::Blogs => "blogs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExactKey {
    Part(String),
    Compatibility { part_number: String, model_number: String },
}

/// Filters for `StructuredStore::filtered_search`. Every set field must match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub scope: RecordScope,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub appliance_type: Option<String>,
    pub model_number: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Case-insensitive substring match against the record's name or symptom.
    pub keyword: Option<String>,
}

impl SearchCriteria {
    pub fn new(scope: RecordScope) -> Self {
        Self { scope, brand: None, category: None, appliance_type: None, model_number: None, min_price: None, max_price: None, keyword: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextScope {
    pub scope: RecordScope,
    pub appliance_type: Option<String>,
}

impl TextScope {
    pub fn new(scope: RecordScope) -> Self { Self { scope, appliance_type: None } }
}

// ---------------------------------------------------------------------------
// Semantic store
// ---------------------------------------------------------------------------

/// Source-type tag carried by every embedded chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Part,
    Repair,
    Blog,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Part => "part",
            Self::Repair => "repair",
            Self::Blog => "blog",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "part" => Some(Self::Part),
            "repair" => Some(Self::Repair),
            "blog" => Some(Self::Blog),
            _ => None,
        }
    }
}

/// A nearest-neighbour result. `doc_id` is the entity identity the chunk was
/// cut from (part number, repair id or blog URL); `score` is in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticHit {
    pub doc_id: String,
    pub chunk: String,
    pub score: f32,
    pub source: SourceKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl SemanticHit {
    pub fn canonical_key(&self) -> EntityKey {
        match self.source {
            SourceKind::Part => EntityKey::part(&self.doc_id),
            SourceKind::Repair => EntityKey::repair(&self.doc_id),
            SourceKind::Blog => EntityKey::blog(&self.doc_id),
        }
    }
}

/// A chunk ready to be embedded and written to the semantic store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingChunk {
    pub id: String,
    pub doc_id: String,
    pub source: SourceKind,
    pub title: String,
    pub url: Option<String>,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

// ---------------------------------------------------------------------------
// Fused context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextItem {
    Part(PartRecord),
    Compatibility(CompatibilityEdge),
    Repair(RepairGuide),
    Semantic(SemanticHit),
    Blog(BlogExcerpt),
}

impl ContextItem {
    pub fn canonical_key(&self) -> EntityKey {
        match self {
            Self::Part(p) => EntityKey::part(&p.part_number),
            Self::Compatibility(c) => EntityKey::compatibility(&c.part_number, &c.model_number),
            Self::Repair(r) => EntityKey::repair(&r.id),
            Self::Semantic(h) => h.canonical_key(),
            Self::Blog(b) => EntityKey::blog(&b.url),
        }
    }

    pub fn part_number(&self) -> Option<&str> {
        match self {
            Self::Part(p) => Some(&p.part_number),
            Self::Compatibility(c) => Some(&c.part_number),
            Self::Semantic(h) if h.source == SourceKind::Part => Some(&h.doc_id),
            _ => None,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::Part(p) => p.name.clone(),
            Self::Compatibility(c) => match &c.part_name {
                Some(name) => format!("{name} (fits {})", c.model_number),
                None => format!("{} (fits {})", c.part_number, c.model_number),
            },
            Self::Repair(r) => format!("{} - {}", r.symptom, r.appliance_type),
            Self::Semantic(h) => h.title.clone().unwrap_or_else(|| h.doc_id.clone()),
            Self::Blog(b) => b.title.clone(),
        }
    }

    pub fn price(&self) -> Option<f64> {
        match self {
            Self::Part(p) => p.price,
            Self::Compatibility(c) => c.price,
            _ => None,
        }
    }

    /// Every URL the item can be cited with, most specific first.
    pub fn urls(&self) -> Vec<String> {
        let candidates: Vec<Option<&String>> = match self {
            Self::Part(p) => vec![p.installation.guide_url.as_ref(), p.installation.video_url.as_ref(), p.product_url.as_ref()],
            Self::Compatibility(c) => vec![c.product_url.as_ref()],
            Self::Repair(r) => vec![r.video_url.as_ref(), r.detail_url.as_ref()],
            Self::Semantic(h) => vec![h.url.as_ref()],
            Self::Blog(b) => vec![Some(&b.url)],
        };
        let mut urls: Vec<String> = Vec::new();
        for url in candidates.into_iter().flatten() {
            if !url.is_empty() && !urls.contains(url) { urls.push(url.clone()); }
        }
        urls
    }
}

impl From<CatalogRecord> for ContextItem {
    fn from(record: CatalogRecord) -> Self {
        match record {
            CatalogRecord::Part(p) => Self::Part(p),
            CatalogRecord::Compatibility(c) => Self::Compatibility(c),
            CatalogRecord::Repair(r) => Self::Repair(r),
            CatalogRecord::Blog(b) => Self::Blog(b),
        }
    }
}

/// How an item reached the context. Lower tiers rank first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    ExactMatch,
    Filtered,
    FullText,
    Semantic,
}

impl Provenance {
    pub fn tier(self) -> u8 {
        match self {
            Self::ExactMatch => 0,
            Self::Filtered | Self::FullText => 1,
            Self::Semantic => 2,
        }
    }

    pub fn is_structured(self) -> bool { self != Self::Semantic }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    pub item: ContextItem,
    pub provenance: Provenance,
    /// Position in the fused order, 0 = most relevant.
    pub rank: usize,
}

/// Ordered, deduplicated, size-bounded context for the answer model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FusedContext {
    entries: Vec<ContextEntry>,
}

impl FusedContext {
    /// Builds a context from already ordered items; ranks follow the order.
    pub fn from_ordered(items: Vec<(ContextItem, Provenance)>) -> Self {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(rank, (item, provenance))| ContextEntry { item, provenance, rank })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self { Self::default() }
    pub fn entries(&self) -> &[ContextEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &ContextEntry> { self.entries.iter() }
    pub fn structured_count(&self) -> usize { self.entries.iter().filter(|e| e.provenance.is_structured()).count() }
    pub fn semantic_count(&self) -> usize { self.entries.len() - self.structured_count() }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Produced by the answer model from retrieved context.
    Grounded,
    /// The answer model was unavailable; text was assembled from context.
    Degraded,
    NoInformation,
    Clarification,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub key: EntityKey,
    pub label: String,
    pub part_number: Option<String>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub structured: usize,
    pub semantic: usize,
    pub semantic_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerPayload {
    pub text: String,
    pub citations: Vec<Citation>,
    pub intent: Option<IntentKind>,
    pub confidence: Option<f32>,
    pub outcome: AnswerOutcome,
    pub sources: SourceSummary,
}

impl AnswerPayload {
    pub fn cites_url(&self, url: &str) -> bool { self.citations.iter().any(|c| c.urls.iter().any(|u| u == url)) }
}

// ---------------------------------------------------------------------------
// LLM boundary
// ---------------------------------------------------------------------------

/// A chat prompt: a system instruction followed by ordered turns, the last of
/// which is the message to answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub turns: Vec<Turn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Requests structured output. The shape is illustrative JSON the model is
/// asked to follow; callers still validate what comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaHint {
    pub name: String,
    pub shape: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(serde_json::Value),
}

impl Completion {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(t) => t,
            Self::Structured(v) => v.to_string(),
        }
    }
}
