//! Second model call: turns the fused context into the customer-facing answer.
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use partsage_core::config::LlmSettings;
use partsage_core::error::LlmError;
use partsage_core::traits::LlmCaller;
use partsage_core::types::{AnswerOutcome, AnswerPayload, Citation, ContextEntry, ContextItem, FusedContext, Prompt, SourceSummary, Turn};

use crate::classifier::duration_ms;

/// Items listed in the degraded answer.
const DEGRADED_ITEMS: usize = 3;
const CHUNK_PREVIEW_CHARS: usize = 800;

pub const NO_INFORMATION: &str = "I don't have that information in the PartSelect catalog right now. \
If you can share the part number (it usually starts with PS) or your appliance's model number I can look again, \
or you can reach PartSelect customer service at 1-866-319-8402.";

const ANSWER_SYSTEM_PROMPT: &str = "You are the PartSelect assistant for refrigerator and dishwasher parts.
Answer the customer using ONLY the numbered catalog context supplied with the question.
- Quote part numbers, prices and availability exactly as written in the context.
- When you mention a part, guide, video or article, include its URL from the context.
- For installation questions, point to the installation guide or video URL when one is listed.
- If the context does not contain the answer, say you don't have that information. Never invent part numbers, prices, models or links.
- Keep answers short and practical. Use a numbered list for step-by-step instructions.";

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmCaller>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    max_history_turns: usize,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmCaller>, settings: &LlmSettings, max_history_turns: usize) -> Self {
        Self {
            llm,
            temperature: settings.answer_temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.timeout(),
            max_history_turns,
        }
    }

    /// Never fails: an empty context short-circuits to the "no information"
    /// answer, and a failed model call degrades to a listing of the top items.
    pub async fn synthesize(&self, query_text: &str, history: &[Turn], context: &FusedContext) -> AnswerPayload {
        let sources = SourceSummary { structured: context.structured_count(), semantic: context.semantic_count(), semantic_fallback: false };
        if context.is_empty() {
            debug!("empty context, skipping answer model");
            return payload(NO_INFORMATION.to_string(), Vec::new(), AnswerOutcome::NoInformation, sources);
        }

        let started = Instant::now();
        match self.generate(query_text, history, context).await {
            Ok(text) => {
                let citations = grounded_citations(&text, context);
                info!(elapsed_ms = duration_ms(started.elapsed()), citations = citations.len(), "answer generated");
                payload(text, citations, AnswerOutcome::Grounded, sources)
            }
            Err(e) => {
                warn!(error = %e, "answer model failed, returning context listing");
                let (text, citations) = degraded_answer(context);
                payload(text, citations, AnswerOutcome::Degraded, sources)
            }
        }
    }

    async fn generate(&self, query_text: &str, history: &[Turn], context: &FusedContext) -> Result<String, LlmError> {
        let prompt = self.build_prompt(query_text, history, context);
        let completion = timeout(self.timeout, self.llm.complete(&prompt, None))
            .await
            .map_err(|_| LlmError::Timeout { timeout_ms: duration_ms(self.timeout) })??;
        let text = completion.into_text().trim().to_string();
        if text.is_empty() {
            return Err(LlmError::MalformedOutput("empty answer".into()));
        }
        Ok(text)
    }

    pub fn build_prompt(&self, query_text: &str, history: &[Turn], context: &FusedContext) -> Prompt {
        let start = history.len().saturating_sub(self.max_history_turns);
        let mut turns: Vec<Turn> = history[start..].to_vec();
        turns.push(Turn::user(format!(
            "Customer question: {query_text}\n\nCatalog context:\n{}\nAnswer the question using only the catalog context above.",
            render_context(context)
        )));
        Prompt { system: ANSWER_SYSTEM_PROMPT.to_string(), turns, temperature: self.temperature, max_tokens: self.max_tokens }
    }
}

fn payload(text: String, citations: Vec<Citation>, outcome: AnswerOutcome, sources: SourceSummary) -> AnswerPayload {
    AnswerPayload { text, citations, intent: None, confidence: None, outcome, sources }
}

/// One block per item, numbered by rank, each ending with the references the
/// model may cite.
pub fn render_context(context: &FusedContext) -> String {
    let mut out = String::new();
    for entry in context.iter() {
        render_entry(&mut out, entry);
    }
    out
}

fn render_entry(out: &mut String, entry: &ContextEntry) {
    let n = entry.rank + 1;
    match &entry.item {
        ContextItem::Part(p) => {
            let _ = writeln!(out, "[{n}] PART {} | {}", p.part_number, p.name);
            if let Some(price) = p.price { let _ = writeln!(out, "    price: ${price:.2}"); }
            if let Some(brand) = &p.brand { let _ = writeln!(out, "    brand: {brand}"); }
            if let Some(availability) = &p.availability { let _ = writeln!(out, "    availability: {availability}"); }
            if let Some(difficulty) = &p.installation.difficulty { let _ = writeln!(out, "    install difficulty: {difficulty}"); }
            if let Some(time) = &p.installation.time { let _ = writeln!(out, "    install time: {time}"); }
            if let Some(url) = &p.installation.guide_url { let _ = writeln!(out, "    installation guide: {url}"); }
            if let Some(url) = &p.installation.video_url { let _ = writeln!(out, "    installation video: {url}"); }
            if !p.symptoms.is_empty() { let _ = writeln!(out, "    fixes: {}", p.symptoms.join(", ")); }
            if !p.compatible_models.is_empty() {
                let shown: Vec<&str> = p.compatible_models.iter().take(10).map(String::as_str).collect();
                let _ = writeln!(out, "    fits models: {}", shown.join(", "));
            }
            if let Some(description) = &p.description { let _ = writeln!(out, "    {description}"); }
        }
        ContextItem::Compatibility(c) => {
            let name = c.part_name.as_deref().unwrap_or("part");
            let _ = writeln!(out, "[{n}] COMPATIBLE: {} ({name}) fits model {}", c.part_number, c.model_number);
            if let Some(price) = c.price { let _ = writeln!(out, "    price: ${price:.2}"); }
        }
        ContextItem::Repair(r) => {
            let _ = writeln!(out, "[{n}] REPAIR GUIDE ({}) {}", r.appliance_type, r.symptom);
            if let Some(pct) = r.percentage_reported { let _ = writeln!(out, "    reported by {pct:.0}% of customers"); }
            if let Some(difficulty) = &r.difficulty { let _ = writeln!(out, "    difficulty: {difficulty}"); }
            if !r.parts_needed.is_empty() { let _ = writeln!(out, "    parts to check: {}", r.parts_needed.join(", ")); }
            if let Some(description) = &r.description { let _ = writeln!(out, "    {description}"); }
        }
        ContextItem::Blog(b) => {
            let _ = writeln!(out, "[{n}] ARTICLE {}", b.title);
            if let Some(excerpt) = &b.excerpt { let _ = writeln!(out, "    {excerpt}"); }
        }
        ContextItem::Semantic(h) => {
            let title = h.title.as_deref().unwrap_or(&h.doc_id);
            let _ = writeln!(out, "[{n}] {} {title} (similarity {:.2})", h.source.as_str().to_uppercase(), h.score);
            let preview: String = h.chunk.chars().take(CHUNK_PREVIEW_CHARS).collect();
            let _ = writeln!(out, "    {preview}");
        }
    }
    let urls = entry.item.urls();
    if !urls.is_empty() {
        let _ = writeln!(out, "    cite: {}", urls.join(" "));
    }
    out.push('\n');
}

pub fn citation_for(item: &ContextItem) -> Citation {
    Citation { key: item.canonical_key(), label: item.title(), part_number: item.part_number().map(str::to_string), urls: item.urls() }
}

/// Items the answer refers to by part number or URL. When the text names
/// none of them, every context item is cited.
fn grounded_citations(text: &str, context: &FusedContext) -> Vec<Citation> {
    let upper = text.to_uppercase();
    let mentioned: Vec<Citation> = context
        .iter()
        .filter(|e| {
            e.item.part_number().is_some_and(|pn| upper.contains(&pn.to_uppercase()))
                || e.item.urls().iter().any(|u| text.contains(u.as_str()))
        })
        .map(|e| citation_for(&e.item))
        .collect();
    if mentioned.is_empty() { context.iter().map(|e| citation_for(&e.item)).collect() } else { mentioned }
}

/// Deterministic answer assembled from the highest-ranked items.
pub fn degraded_answer(context: &FusedContext) -> (String, Vec<Citation>) {
    let mut text = String::from("Here is what I found:");
    let mut citations = Vec::new();
    for entry in context.iter().take(DEGRADED_ITEMS) {
        let item = &entry.item;
        let mut line = item.title();
        if let Some(pn) = item.part_number() {
            if !line.contains(pn) { line.push_str(&format!(" ({pn})")); }
        }
        if let Some(price) = item.price() { line.push_str(&format!(" — ${price:.2}")); }
        if let Some(url) = item.urls().first() { line.push_str(&format!(" — {url}")); }
        text.push_str("\n- ");
        text.push_str(&line);
        citations.push(citation_for(item));
    }
    (text, citations)
}
