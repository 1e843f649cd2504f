#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use partsage_core::config::Settings;
use partsage_core::error::{AdapterError, LlmError};
use partsage_core::traits::{LlmCaller, SemanticStore, StructuredStore};
use partsage_core::types::{
    BlogExcerpt, CatalogRecord, CompatibilityEdge, Completion, ExactKey, Installation, PartRecord, Prompt, RecordScope,
    RepairGuide, SchemaHint, SearchCriteria, SemanticHit, SourceKind, TextScope,
};

pub const INSTALL_GUIDE_URL: &str = "https://www.partselect.com/PS11752778-Whirlpool-W10321304-Refrigerator-Door-Shelf-Bin.htm#install";

// ---------------------------------------------------------------------------
// Structured store
// ---------------------------------------------------------------------------

enum StoreMode {
    Ok,
    Fail,
    Slow(Duration),
}

/// In-memory catalog that counts every call it receives.
pub struct FakeStructured {
    records: Vec<CatalogRecord>,
    mode: StoreMode,
    pub exact_calls: AtomicUsize,
    pub filtered_calls: AtomicUsize,
    pub full_text_calls: AtomicUsize,
    pub criteria: Mutex<Vec<SearchCriteria>>,
}

impl FakeStructured {
    pub fn new(records: Vec<CatalogRecord>) -> Self { Self::with_mode(records, StoreMode::Ok) }
    pub fn empty() -> Self { Self::new(Vec::new()) }
    pub fn failing() -> Self { Self::with_mode(catalog(), StoreMode::Fail) }
    pub fn slow(records: Vec<CatalogRecord>, delay: Duration) -> Self { Self::with_mode(records, StoreMode::Slow(delay)) }

    fn with_mode(records: Vec<CatalogRecord>, mode: StoreMode) -> Self {
        Self {
            records,
            mode,
            exact_calls: AtomicUsize::new(0),
            filtered_calls: AtomicUsize::new(0),
            full_text_calls: AtomicUsize::new(0),
            criteria: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.exact_calls.load(Ordering::SeqCst) + self.filtered_calls.load(Ordering::SeqCst) + self.full_text_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), AdapterError> {
        match self.mode {
            StoreMode::Ok => Ok(()),
            StoreMode::Fail => Err(AdapterError::Connection("catalog unreachable".into())),
            StoreMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

fn eq_ci(a: Option<&str>, b: &str) -> bool { a.is_some_and(|a| a.eq_ignore_ascii_case(b)) }

fn matches(record: &CatalogRecord, c: &SearchCriteria) -> bool {
    if record.scope() != c.scope { return false; }
    match record {
        CatalogRecord::Part(p) => {
            c.brand.as_deref().map_or(true, |b| eq_ci(p.brand.as_deref(), b))
                && c.appliance_type.as_deref().map_or(true, |a| eq_ci(p.category.as_deref(), a))
                && c.category.as_deref().map_or(true, |cat| p.name.to_lowercase().contains(&cat.to_lowercase()))
                && c.min_price.map_or(true, |min| p.price.is_some_and(|price| price >= min))
                && c.max_price.map_or(true, |max| p.price.is_some_and(|price| price <= max))
        }
        CatalogRecord::Compatibility(e) => {
            c.model_number.as_deref().map_or(true, |m| e.model_number.eq_ignore_ascii_case(m))
                && c.brand.as_deref().map_or(true, |b| eq_ci(e.brand.as_deref(), b))
        }
        CatalogRecord::Repair(r) => {
            c.appliance_type.as_deref().map_or(true, |a| r.appliance_type.eq_ignore_ascii_case(a))
                && c.keyword.as_deref().map_or(true, |k| r.symptom.to_lowercase().contains(&k.to_lowercase()))
        }
        CatalogRecord::Blog(_) => true,
    }
}

#[async_trait]
impl StructuredStore for FakeStructured {
    async fn lookup_by_exact_key(&self, key: &ExactKey) -> Result<Option<CatalogRecord>, AdapterError> {
        self.exact_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let found = self.records.iter().find(|r| match (r, key) {
            (CatalogRecord::Part(p), ExactKey::Part(pn)) => p.part_number.eq_ignore_ascii_case(pn),
            (CatalogRecord::Compatibility(e), ExactKey::Compatibility { part_number, model_number }) => {
                e.part_number.eq_ignore_ascii_case(part_number) && e.model_number.eq_ignore_ascii_case(model_number)
            }
            _ => false,
        });
        Ok(found.cloned())
    }

    async fn filtered_search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError> {
        self.filtered_calls.fetch_add(1, Ordering::SeqCst);
        self.criteria.lock().unwrap().push(criteria.clone());
        self.enter().await?;
        Ok(self.records.iter().filter(|r| matches(r, criteria)).take(limit).cloned().collect())
    }

    /// Scores by how many query words of four letters or more appear in the
    /// serialized record.
    async fn full_text_search(&self, text: &str, scope: &TextScope, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError> {
        self.full_text_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 4)
            .map(str::to_string)
            .collect();
        let mut scored: Vec<(usize, &CatalogRecord)> = self
            .records
            .iter()
            .filter(|r| r.scope() == scope.scope)
            .map(|r| {
                let haystack = serde_json::to_string(r).unwrap().to_lowercase();
                (words.iter().filter(|w| haystack.contains(w.as_str())).count(), r)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
    }

    async fn count(&self, scope: RecordScope) -> Result<usize, AdapterError> {
        self.enter().await?;
        Ok(self.records.iter().filter(|r| r.scope() == scope).count())
    }
}

// ---------------------------------------------------------------------------
// Semantic store
// ---------------------------------------------------------------------------

pub struct FakeSemantic {
    hits: Vec<SemanticHit>,
    fail: bool,
    pub calls: AtomicUsize,
    pub filters: Mutex<Vec<Option<Vec<SourceKind>>>>,
}

impl FakeSemantic {
    pub fn new(hits: Vec<SemanticHit>) -> Self { Self { hits, fail: false, calls: AtomicUsize::new(0), filters: Mutex::new(Vec::new()) } }
    pub fn empty() -> Self { Self::new(Vec::new()) }
    pub fn failing() -> Self { Self { fail: true, ..Self::empty() } }
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl SemanticStore for FakeSemantic {
    async fn nearest_neighbors(&self, _text: &str, k: usize, source_filter: Option<&[SourceKind]>) -> Result<Vec<SemanticHit>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(source_filter.map(<[SourceKind]>::to_vec));
        if self.fail {
            return Err(AdapterError::Connection("vector table missing".into()));
        }
        Ok(self
            .hits
            .iter()
            .filter(|h| source_filter.map_or(true, |f| f.contains(&h.source)))
            .take(k)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Answers classification requests (schema present) and answer requests
/// (no schema) from separate scripts.
pub struct FakeLlm {
    classify: Result<Value, LlmError>,
    answer: Result<String, LlmError>,
    pub classify_calls: AtomicUsize,
    pub answer_calls: AtomicUsize,
    pub answer_prompts: Mutex<Vec<Prompt>>,
}

impl FakeLlm {
    pub fn scripted(classify: Value, answer: &str) -> Self { Self::new(Ok(classify), Ok(answer.to_string())) }

    pub fn down() -> Self { Self::new(Err(LlmError::Unavailable("connection refused".into())), Err(LlmError::RateLimited)) }

    pub fn answer_fails(classify: Value) -> Self { Self::new(Ok(classify), Err(LlmError::Timeout { timeout_ms: 20_000 })) }

    fn new(classify: Result<Value, LlmError>, answer: Result<String, LlmError>) -> Self {
        Self { classify, answer, classify_calls: AtomicUsize::new(0), answer_calls: AtomicUsize::new(0), answer_prompts: Mutex::new(Vec::new()) }
    }

    pub fn answer_calls(&self) -> usize { self.answer_calls.load(Ordering::SeqCst) }
    pub fn classify_calls(&self) -> usize { self.classify_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl LlmCaller for FakeLlm {
    async fn complete(&self, prompt: &Prompt, schema: Option<&SchemaHint>) -> Result<Completion, LlmError> {
        if schema.is_some() {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            return self.classify.clone().map(Completion::Structured);
        }
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        self.answer_prompts.lock().unwrap().push(prompt.clone());
        self.answer.clone().map(Completion::Text)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.llm.timeout_ms = 2_000;
    settings.retrieval.structured_timeout_ms = 1_000;
    settings.retrieval.semantic_timeout_ms = 1_000;
    settings
}

pub fn door_bin() -> PartRecord {
    PartRecord {
        part_number: "PS11752778".into(),
        name: "Refrigerator Door Shelf Bin".into(),
        description: Some("Clear door bin that holds condiments and bottles.".into()),
        price: Some(44.95),
        brand: Some("Whirlpool".into()),
        manufacturer_id: Some("W10321304".into()),
        category: Some("refrigerator".into()),
        availability: Some("In Stock".into()),
        in_stock: true,
        installation: Installation {
            difficulty: Some("Really Easy".into()),
            time: Some("Less than 15 mins".into()),
            video_url: Some("https://www.youtube.com/watch?v=zSCNN6KpDE8".into()),
            guide_url: Some(INSTALL_GUIDE_URL.into()),
        },
        product_url: Some("https://www.partselect.com/PS11752778-Whirlpool-W10321304-Refrigerator-Door-Shelf-Bin.htm".into()),
        compatible_models: vec!["WRF555SDFZ".into()],
        ..Default::default()
    }
}

pub fn dishrack_wheel() -> PartRecord {
    PartRecord {
        part_number: "PS3406971".into(),
        name: "Dishwasher Lower Dishrack Wheel".into(),
        price: Some(32.10),
        brand: Some("Whirlpool".into()),
        category: Some("dishwasher".into()),
        product_url: Some("https://www.partselect.com/PS3406971-Whirlpool-W10195416-Lower-Dishrack-Wheel.htm".into()),
        compatible_models: vec!["WDT780SAEM1".into()],
        ..Default::default()
    }
}

fn edge(part: &PartRecord, model: &str) -> CompatibilityEdge {
    CompatibilityEdge {
        part_number: part.part_number.clone(),
        model_number: model.into(),
        brand: part.brand.clone(),
        appliance_type: part.category.clone(),
        part_name: Some(part.name.clone()),
        price: part.price,
        product_url: part.product_url.clone(),
    }
}

pub fn ice_maker_repair() -> RepairGuide {
    RepairGuide {
        id: "refrigerator:ice-maker-not-making-ice".into(),
        appliance_type: "refrigerator".into(),
        symptom: "Ice maker not making ice".into(),
        description: Some("Check the water inlet valve, then the ice maker assembly.".into()),
        percentage_reported: Some(29.0),
        parts_needed: vec!["Water Inlet Valve".into(), "Ice Maker Assembly".into()],
        video_url: Some("https://www.youtube.com/watch?v=ice-maker".into()),
        detail_url: Some("https://www.partselect.com/Repair/Refrigerator/Ice-Maker-Not-Making-Ice/".into()),
        ..Default::default()
    }
}

pub fn filter_blog() -> BlogExcerpt {
    BlogExcerpt {
        title: "How to Clean a Dishwasher Filter".into(),
        url: "https://www.partselect.com/blog/how-to-clean-dishwasher-filter/".into(),
        excerpt: Some("A clogged filter leaves dishes dirty.".into()),
        ..Default::default()
    }
}

pub fn catalog() -> Vec<CatalogRecord> {
    let bin = door_bin();
    let wheel = dishrack_wheel();
    vec![
        CatalogRecord::Compatibility(edge(&bin, "WRF555SDFZ")),
        CatalogRecord::Compatibility(edge(&wheel, "WDT780SAEM1")),
        CatalogRecord::Part(bin),
        CatalogRecord::Part(wheel),
        CatalogRecord::Repair(ice_maker_repair()),
        CatalogRecord::Blog(filter_blog()),
    ]
}

pub fn semantic_hits() -> Vec<SemanticHit> {
    vec![
        SemanticHit {
            doc_id: "refrigerator:ice-maker-not-making-ice".into(),
            chunk: "If the ice maker is not making ice, test the water inlet valve first.".into(),
            score: 0.82,
            source: SourceKind::Repair,
            title: Some("Ice maker not making ice".into()),
            url: Some("https://www.partselect.com/Repair/Refrigerator/Ice-Maker-Not-Making-Ice/".into()),
        },
        SemanticHit {
            doc_id: "https://www.partselect.com/blog/ice-maker-troubleshooting/".into(),
            chunk: "Ice maker troubleshooting: frozen fill tube, bad inlet valve.".into(),
            score: 0.64,
            source: SourceKind::Blog,
            title: Some("Why Is My Ice Maker Not Working?".into()),
            url: Some("https://www.partselect.com/blog/ice-maker-troubleshooting/".into()),
        },
        SemanticHit {
            doc_id: "PS11752778".into(),
            chunk: "Refrigerator door shelf bin, clear, fits many Whirlpool side-by-side models.".into(),
            score: 0.55,
            source: SourceKind::Part,
            title: Some("Refrigerator Door Shelf Bin".into()),
            url: Some("https://www.partselect.com/PS11752778-Whirlpool-W10321304-Refrigerator-Door-Shelf-Bin.htm".into()),
        },
    ]
}

pub struct Harness {
    pub structured: Arc<FakeStructured>,
    pub semantic: Arc<FakeSemantic>,
    pub llm: Arc<FakeLlm>,
}

impl Harness {
    pub fn new(structured: FakeStructured, semantic: FakeSemantic, llm: FakeLlm) -> Self {
        Self { structured: Arc::new(structured), semantic: Arc::new(semantic), llm: Arc::new(llm) }
    }

    pub fn assistant(&self, settings: &Settings) -> partsage_agent::Assistant {
        partsage_agent::Assistant::new(self.structured.clone(), self.semantic.clone(), self.llm.clone(), settings)
    }

    pub fn router(&self, settings: &Settings) -> partsage_agent::RetrievalRouter {
        partsage_agent::RetrievalRouter::new(self.structured.clone(), self.semantic.clone(), settings.retrieval.clone())
    }
}
