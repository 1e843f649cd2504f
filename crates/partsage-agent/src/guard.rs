//! Short-circuits queries outside refrigerator and dishwasher parts.
use partsage_core::types::{AnswerOutcome, AnswerPayload, Intent, IntentKind, SourceSummary};

pub const REFUSAL: &str = "I specialize in refrigerator and dishwasher parts and repairs. \
I can help you find a part, check whether a part fits your model, or troubleshoot a problem with your appliance. \
For anything else, please contact PartSelect customer service at 1-866-319-8402.";

pub fn is_out_of_scope(intent: &Intent) -> bool { intent.kind == IntentKind::OutOfScope }

pub fn refusal(intent: &Intent) -> AnswerPayload {
    AnswerPayload {
        text: REFUSAL.to_string(),
        citations: Vec::new(),
        intent: Some(intent.kind),
        confidence: Some(intent.confidence),
        outcome: AnswerOutcome::Refused,
        sources: SourceSummary::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::classify_by_rules;

    #[test]
    fn refusal_names_domain_and_phone() {
        let intent = classify_by_rules("what's your favorite movie?", &[]);
        assert!(is_out_of_scope(&intent));
        let payload = refusal(&intent);
        assert_eq!(payload.outcome, AnswerOutcome::Refused);
        assert!(payload.text.contains("refrigerator and dishwasher"));
        assert!(payload.text.contains("1-866-319-8402"));
        assert!(payload.citations.is_empty());
    }
}
