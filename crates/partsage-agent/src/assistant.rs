use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use partsage_core::config::Settings;
use partsage_core::error::Cancelled;
use partsage_core::traits::{LlmCaller, SemanticStore, StructuredStore};
use partsage_core::types::{AnswerOutcome, AnswerPayload, ContextItem, FusedContext, Intent, IntentKind, SourceSummary, Turn};

use crate::classifier::{duration_ms, IntentClassifier};
use crate::guard;
use crate::router::RetrievalRouter;
use crate::synthesizer::AnswerSynthesizer;

const LOG_QUERY_CHARS: usize = 100;

const EMPTY_QUERY_PROMPT: &str = "What can I help you with? Ask me about a refrigerator or dishwasher part, \
whether a part fits your model, or a problem you're seeing with your appliance.";

/// Classify, guard, retrieve, fuse and synthesize, one request at a time.
///
/// Holds no per-conversation state; callers own history and pass it in.
pub struct Assistant {
    classifier: IntentClassifier,
    router: RetrievalRouter,
    synthesizer: AnswerSynthesizer,
    max_history_turns: usize,
}

impl Assistant {
    pub fn new(
        structured: Arc<dyn StructuredStore>,
        semantic: Arc<dyn SemanticStore>,
        llm: Arc<dyn LlmCaller>,
        settings: &Settings,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&llm), &settings.llm),
            router: RetrievalRouter::new(structured, semantic, settings.retrieval.clone()),
            synthesizer: AnswerSynthesizer::new(llm, &settings.llm, settings.conversation.max_history_turns),
            max_history_turns: settings.conversation.max_history_turns,
        }
    }

    /// Always produces a natural-language payload; store and model failures
    /// surface as degraded or "no information" answers.
    pub async fn answer(&self, query_text: &str, thread_id: &str, history: &[Turn]) -> AnswerPayload {
        let started = Instant::now();
        info!(thread_id, query = %preview(query_text), history = history.len(), "answering");

        if query_text.trim().is_empty() {
            return clarification(EMPTY_QUERY_PROMPT.to_string(), None, &FusedContext::empty(), false);
        }
        // every stage sees the same window, so nothing older can resurface a part
        let history = &history[history.len().saturating_sub(self.max_history_turns)..];

        let intent = self.classifier.classify(query_text, history).await;
        info!(
            thread_id,
            intent = %intent.kind,
            confidence = intent.confidence,
            source = ?intent.source,
            parts = ?intent.entities.part_numbers,
            models = ?intent.entities.model_numbers,
            "classified"
        );
        if guard::is_out_of_scope(&intent) {
            info!(thread_id, "out of scope, refusing");
            return guard::refusal(&intent);
        }

        let routed = self.router.route(query_text, &intent).await;
        if routed.failed_calls > 0 {
            warn!(thread_id, failed = routed.failed_calls, "answering with partial retrieval");
        }

        if let Some(question) = missing_part_question(&intent, &routed.context) {
            debug!(thread_id, "compatibility question without a part");
            return clarification(question, Some(&intent), &routed.context, routed.semantic_fallback);
        }

        let mut payload = self.synthesizer.synthesize(query_text, history, &routed.context).await;
        payload.intent = Some(intent.kind);
        payload.confidence = Some(intent.confidence);
        payload.sources.semantic_fallback = routed.semantic_fallback;
        info!(
            thread_id,
            outcome = ?payload.outcome,
            citations = payload.citations.len(),
            elapsed_ms = duration_ms(started.elapsed()),
            "answered"
        );
        payload
    }

    /// Races the pipeline against `cancelled`. Once cancellation wins the
    /// pipeline future is dropped, so no further store or model call is awaited.
    pub async fn answer_or_cancel<C>(&self, query_text: &str, thread_id: &str, history: &[Turn], cancelled: C) -> Result<AnswerPayload, Cancelled>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                info!(thread_id, "request cancelled");
                Err(Cancelled)
            }
            payload = self.answer(query_text, thread_id, history) => Ok(payload),
        }
    }
}

/// A compatibility question needs a part. When neither the query, the
/// history nor the model-only lookup supplied one, ask for it.
fn missing_part_question(intent: &Intent, context: &FusedContext) -> Option<String> {
    if intent.kind != IntentKind::CompatibilityCheck || intent.entities.part_number().is_some() {
        return None;
    }
    let has_catalog_parts = context.iter().any(|e| matches!(e.item, ContextItem::Compatibility(_) | ContextItem::Part(_)));
    if has_catalog_parts {
        return None;
    }
    Some(match intent.entities.model_number() {
        Some(model) => format!(
            "Which part would you like to check against model {model}? \
             Share the part number (it usually starts with PS) and I'll confirm whether it fits."
        ),
        None => "Which part and which appliance model would you like me to check? \
                 The model number is usually on a sticker inside the door or along the frame."
            .to_string(),
    })
}

fn clarification(text: String, intent: Option<&Intent>, context: &FusedContext, semantic_fallback: bool) -> AnswerPayload {
    AnswerPayload {
        text,
        citations: Vec::new(),
        intent: intent.map(|i| i.kind),
        confidence: intent.map(|i| i.confidence),
        outcome: AnswerOutcome::Clarification,
        sources: SourceSummary { structured: context.structured_count(), semantic: context.semantic_count(), semantic_fallback },
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(LOG_QUERY_CHARS).collect();
    if text.chars().count() > LOG_QUERY_CHARS { out.push_str("..."); }
    out
}
