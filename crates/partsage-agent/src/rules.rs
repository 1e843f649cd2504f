//! Keyword and pattern heuristics used when the classifier model is
//! unavailable, and to backfill entities the model missed.
//!
//! Precedence when several rules match: part lookup, then compatibility,
//! then troubleshooting, then general info. A query with no domain signal at
//! all and no prior conversation is out of scope.
use regex::Regex;
use std::sync::LazyLock;

use partsage_core::types::{Entities, Intent, IntentKind, IntentSource, Role, Turn};

pub const RULE_CONFIDENCE: f32 = 0.8;
/// The catch-all guess; low enough to widen the semantic fallback.
pub const GENERAL_CONFIDENCE: f32 = 0.4;
pub const OUT_OF_SCOPE_CONFIDENCE: f32 = 0.6;

static PART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:PS|AP|EAP|WPW|WP|W)\d{5,}\b").expect("part number regex is valid"));
static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}\d+[A-Z0-9]*\b").expect("model number regex is valid"));
static MAX_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:under|below|less than|cheaper than|at most|max(?:imum)?)\s*\$?\s*(\d+(?:\.\d{1,2})?)").expect("max price regex is valid")
});
/// "up to" bounds a price only with a currency marker; "up to 2 hours" is not a price.
static UP_TO_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"up to\s*(?:\$\s*(\d+(?:\.\d{1,2})?)|(\d+(?:\.\d{1,2})?)\s*(?:dollars|bucks|usd)\b)").expect("up-to price regex is valid")
});
static MIN_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:over|above|more than|at least|min(?:imum)?)\s*\$?\s*(\d+(?:\.\d{1,2})?)").expect("min price regex is valid")
});
static BETWEEN_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"between\s*\$?\s*(\d+(?:\.\d{1,2})?)\s*(?:and|-|to)\s*\$?\s*(\d+(?:\.\d{1,2})?)").expect("price range regex is valid")
});

const MIN_MODEL_LEN: usize = 6;

const SYMPTOM_PHRASES: &[&str] = &[
    "not working", "not making", "not cooling", "not draining", "not cleaning", "not dispensing", "not drying",
    "not starting", "stopped working", "won't work", "doesn't work", "won't", "leaking", "leak", "broken",
    "noisy", "loud", "problem", "issue", "troubleshoot", "repair", "fix",
];

const COMPATIBILITY_PHRASES: &[&str] = &["compatible", "compatibility", "fit", "fits", "work with", "works with"];

/// Display names keyed by the lower-case word that triggers them.
const BRANDS: &[(&str, &str)] = &[
    ("whirlpool", "Whirlpool"),
    ("ge", "GE"),
    ("frigidaire", "Frigidaire"),
    ("kenmore", "Kenmore"),
    ("samsung", "Samsung"),
    ("lg", "LG"),
    ("maytag", "Maytag"),
    ("bosch", "Bosch"),
    ("kitchenaid", "KitchenAid"),
    ("amana", "Amana"),
];

/// Longer phrases first so "water filter" wins over "filter".
const PART_TYPES: &[&str] = &[
    "water inlet valve", "water filter", "door gasket", "door seal", "spray arm", "ice maker", "door bin", "shelf bin",
    "drain pump", "filter", "seal", "gasket", "pump", "motor", "valve", "hose", "dispenser", "thermostat", "rack",
    "drawer", "shelf", "bin", "door", "fan", "heater", "switch", "latch", "wheel",
];

const DOMAIN_WORDS: &[&str] = &[
    "part", "parts", "appliance", "model", "install", "installation", "replace", "replacement", "repair", "price",
    "cost", "order", "stock", "ice", "water", "freezer", "cooling", "clean", "maintenance", "partselect",
];

pub fn extract_part_numbers(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut found: Vec<String> = Vec::new();
    for m in PART_RE.find_iter(&upper) {
        let token = m.as_str().to_string();
        if !found.contains(&token) { found.push(token); }
    }
    found
}

pub fn extract_model_numbers(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut found: Vec<String> = Vec::new();
    for m in MODEL_RE.find_iter(&upper) {
        let token = m.as_str();
        if token.len() < MIN_MODEL_LEN || PART_RE.is_match(token) { continue; }
        if !found.iter().any(|f| f == token) { found.push(token.to_string()); }
    }
    found
}

/// Everything the heuristics can pull out of one message.
pub fn extract_entities(text: &str) -> Entities {
    let lower = normalized_lower(text);
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric() && c != '\'').filter(|w| !w.is_empty()).collect();

    let symptoms = SYMPTOM_PHRASES
        .iter()
        .filter(|p| contains_phrase(&lower, &words, p))
        .map(|p| p.to_string())
        .collect();
    let brand = BRANDS.iter().find(|(needle, _)| words.contains(needle)).map(|(_, name)| name.to_string());
    let category = PART_TYPES.iter().find(|p| contains_phrase(&lower, &words, p)).map(|p| p.to_string());
    let appliance_type = appliance_from_words(&lower, &words);
    let (min_price, max_price) = price_bounds(&lower);

    Entities {
        part_numbers: extract_part_numbers(text),
        model_numbers: extract_model_numbers(text),
        symptoms,
        brand,
        category,
        appliance_type,
        min_price,
        max_price,
        part_from_history: false,
    }
}

/// Lower-cases and folds typographic apostrophes, so "won’t" reads as "won't".
fn normalized_lower(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

fn appliance_from_words(lower: &str, words: &[&str]) -> Option<String> {
    if words.iter().any(|w| matches!(*w, "refrigerator" | "refrigerators" | "fridge" | "fridges" | "freezer"))
        || lower.contains("ice maker")
    {
        Some("refrigerator".to_string())
    } else if words.iter().any(|w| matches!(*w, "dishwasher" | "dishwashers")) {
        Some("dishwasher".to_string())
    } else {
        None
    }
}

fn price_bounds(lower: &str) -> (Option<f64>, Option<f64>) {
    if let Some(caps) = BETWEEN_PRICE_RE.captures(lower) {
        let a = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
        let b = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
        if let (Some(a), Some(b)) = (a, b) {
            return (Some(a.min(b)), Some(a.max(b)));
        }
    }
    let max = MAX_PRICE_RE
        .captures(lower)
        .and_then(|c| c.get(1))
        .or_else(|| UP_TO_PRICE_RE.captures(lower).and_then(|c| c.get(1).or_else(|| c.get(2))))
        .and_then(|m| m.as_str().parse().ok());
    let min = MIN_PRICE_RE.captures(lower).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok());
    (min, max)
}

/// Single words match whole tokens only ("ge" must not fire on "get");
/// phrases match as substrings.
fn contains_phrase(lower: &str, words: &[&str], phrase: &str) -> bool {
    if phrase.contains(' ') { lower.contains(phrase) } else { words.contains(&phrase) }
}

fn has_domain_signal(lower: &str, words: &[&str], entities: &Entities) -> bool {
    !entities.part_numbers.is_empty()
        || !entities.model_numbers.is_empty()
        || !entities.symptoms.is_empty()
        || entities.brand.is_some()
        || entities.category.is_some()
        || entities.appliance_type.is_some()
        || entities.has_price_bound()
        || DOMAIN_WORDS.iter().any(|w| contains_phrase(lower, words, w))
}

/// Classifies a query from heuristics alone.
pub fn classify_by_rules(text: &str, history: &[Turn]) -> Intent {
    let lower = normalized_lower(text);
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric() && c != '\'').filter(|w| !w.is_empty()).collect();
    let entities = extract_entities(text);

    let has_part = !entities.part_numbers.is_empty();
    let has_model = !entities.model_numbers.is_empty();
    let part_reference = has_part || words.iter().any(|w| *w == "part" || *w == "parts")
        || COMPATIBILITY_PHRASES.iter().any(|p| contains_phrase(&lower, &words, p));

    let (kind, confidence) = if has_part && !has_model {
        (IntentKind::PartLookup, RULE_CONFIDENCE)
    } else if has_model && part_reference {
        (IntentKind::CompatibilityCheck, RULE_CONFIDENCE)
    } else if !entities.symptoms.is_empty() {
        (IntentKind::Troubleshooting, RULE_CONFIDENCE)
    } else if history.is_empty() && !has_domain_signal(&lower, &words, &entities) {
        (IntentKind::OutOfScope, OUT_OF_SCOPE_CONFIDENCE)
    } else {
        (IntentKind::GeneralInfo, GENERAL_CONFIDENCE)
    };

    let mut intent = Intent { kind, entities, confidence, source: IntentSource::Rules };
    fill_part_from_history(&mut intent, history);
    intent
}

/// Most recent part-number token mentioned by the user, newest turn first.
pub fn part_from_history(history: &[Turn]) -> Option<String> {
    history
        .iter()
        .rev()
        .filter(|t| t.role == Role::User)
        .find_map(|t| extract_part_numbers(&t.content).into_iter().next())
}

/// A compatibility question without a part number inherits the last part
/// the user asked about.
pub fn fill_part_from_history(intent: &mut Intent, history: &[Turn]) {
    if intent.kind != IntentKind::CompatibilityCheck || !intent.entities.part_numbers.is_empty() {
        return;
    }
    if let Some(part) = part_from_history(history) {
        intent.entities.part_numbers.push(part);
        intent.entities.part_from_history = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_number_query_is_part_lookup() {
        let intent = classify_by_rules("How can I install part number PS11752778?", &[]);
        assert_eq!(intent.kind, IntentKind::PartLookup);
        assert_eq!(intent.entities.part_numbers, vec!["PS11752778"]);
        assert!(intent.entities.model_numbers.is_empty());
        assert_eq!(intent.source, IntentSource::Rules);
    }

    #[test]
    fn every_part_token_is_extracted() {
        let parts = extract_part_numbers("Compare ps11752778, W10295370 and PS3406971 please");
        assert_eq!(parts, vec!["PS11752778", "W10295370", "PS3406971"]);
    }

    #[test]
    fn model_with_part_reference_is_compatibility() {
        let intent = classify_by_rules("Is this part compatible with my WDT780SAEM1 model?", &[]);
        assert_eq!(intent.kind, IntentKind::CompatibilityCheck);
        assert_eq!(intent.entities.model_numbers, vec!["WDT780SAEM1"]);
        assert!(intent.entities.part_numbers.is_empty());
    }

    #[test]
    fn part_and_model_is_compatibility_not_lookup() {
        let intent = classify_by_rules("Does PS11752778 fit WRF555SDFZ?", &[]);
        assert_eq!(intent.kind, IntentKind::CompatibilityCheck);
        assert_eq!(intent.entities.part_number(), Some("PS11752778"));
        assert_eq!(intent.entities.model_number(), Some("WRF555SDFZ"));
    }

    #[test]
    fn part_token_outranks_symptom() {
        let intent = classify_by_rules("My PS11752778 is broken and leaking", &[]);
        assert_eq!(intent.kind, IntentKind::PartLookup);
        assert!(intent.entities.symptoms.contains(&"leaking".to_string()));
    }

    #[test]
    fn symptom_query_is_troubleshooting() {
        let intent = classify_by_rules("The ice maker on my Whirlpool fridge is not working", &[]);
        assert_eq!(intent.kind, IntentKind::Troubleshooting);
        assert_eq!(intent.entities.appliance_type.as_deref(), Some("refrigerator"));
        assert_eq!(intent.entities.brand.as_deref(), Some("Whirlpool"));
        assert_eq!(intent.entities.category.as_deref(), Some("ice maker"));
    }

    #[test]
    fn brand_needs_whole_word() {
        let entities = extract_entities("How do I get the dishwasher rack out?");
        assert_eq!(entities.brand, None);
        assert_eq!(entities.appliance_type.as_deref(), Some("dishwasher"));
    }

    #[test]
    fn price_bounds_are_parsed() {
        let e = extract_entities("water filter under $50");
        assert_eq!((e.min_price, e.max_price), (None, Some(50.0)));
        let e = extract_entities("door gasket between $20 and 45.50");
        assert_eq!((e.min_price, e.max_price), (Some(20.0), Some(45.5)));
    }

    #[test]
    fn up_to_needs_a_currency_marker() {
        assert_eq!(extract_entities("dishwasher runs up to 2 hours").max_price, None);
        assert_eq!(extract_entities("fridge shelf up to $30").max_price, Some(30.0));
        assert_eq!(extract_entities("water filter up to 25 dollars").max_price, Some(25.0));
    }

    #[test]
    fn typographic_apostrophe_is_a_symptom() {
        let intent = classify_by_rules("My dishwasher won\u{2019}t start", &[]);
        assert_eq!(intent.kind, IntentKind::Troubleshooting);
        assert!(intent.entities.symptoms.contains(&"won't".to_string()));
    }

    #[test]
    fn unrelated_query_is_out_of_scope() {
        let intent = classify_by_rules("what's your favorite movie?", &[]);
        assert_eq!(intent.kind, IntentKind::OutOfScope);
    }

    #[test]
    fn follow_up_without_signal_is_general() {
        let history = vec![Turn::user("Tell me about PS11752778"), Turn::assistant("It is a door bin.")];
        let intent = classify_by_rules("and how long does shipping take?", &history);
        assert_eq!(intent.kind, IntentKind::GeneralInfo);
        assert!(intent.is_low_confidence(0.5));
    }

    #[test]
    fn compatibility_takes_part_from_latest_user_turn() {
        let history = vec![
            Turn::user("What is PS3406971?"),
            Turn::assistant("A spray arm, see PS99999999 too."),
            Turn::user("And PS11752778?"),
            Turn::assistant("A door bin."),
        ];
        let intent = classify_by_rules("Is it compatible with my WDT780SAEM1 model?", &history);
        assert_eq!(intent.kind, IntentKind::CompatibilityCheck);
        assert_eq!(intent.entities.part_number(), Some("PS11752778"));
        assert!(intent.entities.part_from_history);
    }

    #[test]
    fn short_codes_are_not_models() {
        assert!(extract_model_numbers("my GE123 fridge").is_empty());
        assert!(extract_model_numbers("part PS11752778").is_empty());
    }
}
