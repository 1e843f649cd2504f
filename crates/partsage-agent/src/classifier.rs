use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use partsage_core::config::LlmSettings;
use partsage_core::error::LlmError;
use partsage_core::traits::LlmCaller;
use partsage_core::types::{Completion, Entities, Intent, IntentKind, IntentSource, Prompt, Role, SchemaHint, Turn};

use crate::rules::{classify_by_rules, extract_entities, extract_model_numbers, extract_part_numbers, fill_part_from_history};

/// Turns from the conversation shown to the classifier.
const CLASSIFY_HISTORY_TURNS: usize = 4;
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.7;

const CLASSIFY_SYSTEM_PROMPT: &str = "You analyze questions sent to a refrigerator and dishwasher parts assistant.
Pick exactly one intent:
- part_lookup: a specific part, by part number (PS or manufacturer number) or by description, price or brand
- compatibility_check: whether a part fits an appliance model, or which parts fit a model
- troubleshooting: a symptom or malfunction (leaking, not working, noisy, won't start)
- general_info: how-to, installation, maintenance or other questions about refrigerator/dishwasher parts
- out_of_scope: anything unrelated to refrigerator or dishwasher parts and repair
Extract part numbers and model numbers verbatim, symptom phrases, a brand name, a part category
(filter, gasket, ice maker, ...), the appliance type (refrigerator or dishwasher) and numeric price bounds.
Use null or [] for anything absent. Only report part or model numbers the user actually wrote;
a description such as \"the water filter\" is a category, not a part number.";

/// Maps a query to an intent with one model call, falling back to the
/// keyword rules when the call fails or returns something unusable.
pub struct IntentClassifier {
    llm: Arc<dyn LlmCaller>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ModelIntent {
    intent: String,
    /// Models send numbers, numeric strings or "NaN"; anything unusable
    /// falls back to the default.
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    part_numbers: Vec<String>,
    #[serde(default)]
    model_numbers: Vec<String>,
    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    appliance_type: Option<String>,
    #[serde(default)]
    min_price: Option<f64>,
    #[serde(default)]
    max_price: Option<f64>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmCaller>, settings: &LlmSettings) -> Self {
        Self { llm, temperature: settings.classify_temperature, max_tokens: settings.classify_max_tokens, timeout: settings.timeout() }
    }

    pub async fn classify(&self, query_text: &str, history: &[Turn]) -> Intent {
        match self.classify_with_model(query_text, history).await {
            Ok(mut intent) => {
                fill_part_from_history(&mut intent, history);
                debug!(intent = %intent.kind, confidence = intent.confidence, "model classification");
                intent
            }
            Err(e) => {
                let intent = classify_by_rules(query_text, history);
                warn!(error = %e, intent = %intent.kind, "classifier model failed, using rules");
                intent
            }
        }
    }

    async fn classify_with_model(&self, query_text: &str, history: &[Turn]) -> Result<Intent, LlmError> {
        let prompt = self.build_prompt(query_text, history);
        let schema = SchemaHint { name: "intent".into(), shape: intent_shape() };
        let completion = timeout(self.timeout, self.llm.complete(&prompt, Some(&schema)))
            .await
            .map_err(|_| LlmError::Timeout { timeout_ms: duration_ms(self.timeout) })??;
        let value = match completion {
            Completion::Structured(value) => value,
            Completion::Text(text) => serde_json::from_str(&text).map_err(|e| LlmError::MalformedOutput(e.to_string()))?,
        };
        parse_model_intent(value, query_text, history)
    }

    fn build_prompt(&self, query_text: &str, history: &[Turn]) -> Prompt {
        let start = history.len().saturating_sub(CLASSIFY_HISTORY_TURNS);
        let mut turns: Vec<Turn> = history[start..].to_vec();
        turns.push(Turn::user(format!("Classify this query: {query_text}")));
        Prompt { system: CLASSIFY_SYSTEM_PROMPT.to_string(), turns, temperature: self.temperature, max_tokens: self.max_tokens }
    }
}

fn intent_shape() -> serde_json::Value {
    json!({
        "intent": "part_lookup | compatibility_check | troubleshooting | general_info | out_of_scope",
        "confidence": "number between 0 and 1",
        "part_numbers": ["part numbers copied from the user's text"],
        "model_numbers": ["appliance model numbers copied from the user's text"],
        "symptoms": ["symptom phrases"],
        "brand": "brand name or null",
        "category": "part category or null",
        "appliance_type": "refrigerator | dishwasher | null",
        "min_price": "number or null",
        "max_price": "number or null"
    })
}

/// Validates the model's answer. Part numbers the rules can see in the query
/// are always kept. A part or model number from the model survives only if
/// the user wrote it, in this query or an earlier user turn.
fn parse_model_intent(value: serde_json::Value, query_text: &str, history: &[Turn]) -> Result<Intent, LlmError> {
    let raw: ModelIntent = serde_json::from_value(value).map_err(|e| LlmError::MalformedOutput(e.to_string()))?;
    let kind = IntentKind::parse_label(&raw.intent).ok_or_else(|| LlmError::MalformedOutput(format!("unknown intent label {:?}", raw.intent)))?;
    let confidence = raw.confidence.as_ref().and_then(confidence_value).unwrap_or(DEFAULT_MODEL_CONFIDENCE);

    let ruled = extract_entities(query_text);
    let earlier_parts: Vec<String> = user_turns(history).flat_map(extract_part_numbers).collect();
    let earlier_models: Vec<String> = user_turns(history).flat_map(extract_model_numbers).collect();

    let mut part_numbers = ruled.part_numbers;
    let mut part_from_history = false;
    for pn in raw.part_numbers.iter().map(|p| p.trim().to_uppercase()).filter(|p| !p.is_empty()) {
        if part_numbers.contains(&pn) { continue; }
        if earlier_parts.contains(&pn) {
            part_from_history |= part_numbers.is_empty();
            part_numbers.push(pn);
        } else {
            debug!(part_number = %pn, "dropping part number the user never wrote");
        }
    }
    let mut model_numbers = ruled.model_numbers;
    for m in raw.model_numbers.iter().map(|m| m.trim().to_uppercase()).filter(|m| !m.is_empty()) {
        if model_numbers.contains(&m) { continue; }
        if earlier_models.contains(&m) {
            model_numbers.push(m);
        } else {
            debug!(model_number = %m, "dropping model number the user never wrote");
        }
    }
    model_numbers.retain(|m| !part_numbers.contains(m));

    let (mut min_price, mut max_price) = (raw.min_price.or(ruled.min_price), raw.max_price.or(ruled.max_price));
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max { (min_price, max_price) = (Some(max), Some(min)); }
    }

    let entities = Entities {
        part_numbers,
        model_numbers,
        symptoms: if raw.symptoms.is_empty() { ruled.symptoms } else { raw.symptoms },
        brand: non_blank(raw.brand).or(ruled.brand),
        category: non_blank(raw.category).or(ruled.category),
        appliance_type: non_blank(raw.appliance_type).map(|a| a.to_lowercase()).or(ruled.appliance_type),
        min_price,
        max_price,
        part_from_history,
    };
    Ok(Intent { kind, entities, confidence, source: IntentSource::Model })
}

fn user_turns(history: &[Turn]) -> impl Iterator<Item = &str> {
    history.iter().filter(|t| t.role == Role::User).map(|t| t.content.as_str())
}

fn confidence_value(value: &serde_json::Value) -> Option<f32> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    raw.is_finite().then(|| raw.clamp(0.0, 1.0) as f32)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

pub(crate) fn duration_ms(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }
