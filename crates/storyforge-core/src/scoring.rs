// ABOUTME: Quality and confidence scoring strategies for generated text.
// ABOUTME: Heuristic keyword-based defaults sit behind narrow traits so they can be swapped.

use crate::validate::{CRITERIA_HEADER, MAX_CRITERIA, MIN_CRITERIA, STORY_OPENING, criteria_lines};

/// Confidence below which an agent's output triggers a consultation round.
pub const CONFIDENCE_THRESHOLD: f64 = 0.55;

/// Scores a candidate story's structural quality in [0, 1].
pub trait QualityScorer: Send + Sync {
    fn score(&self, candidate: &str) -> f64;
}

/// Scores how confident a piece of agent prose reads, in [0, 1].
pub trait ConfidenceScorer: Send + Sync {
    fn confidence(&self, text: &str) -> f64;
}

// Weights for the quality score. The three structural gates contribute the
// fixed portion; keyword signals fill the remainder up to 1.0.
const W_OPENING: f64 = 0.3;
const W_HEADER: f64 = 0.2;
const W_COUNT: f64 = 0.15;
const W_OBLIGATION: f64 = 0.15;
const W_MEASURABILITY: f64 = 0.1;
const W_COVERAGE: f64 = 0.1;

const OBLIGATION_KEYWORDS: &[&str] = &[
    "must",
    "should",
    "will",
    "can",
    "needs to",
    "is required to",
];

const MEASURABILITY_KEYWORDS: &[&str] = &[
    "measured",
    "tracked",
    "percentage",
    "within",
    "at least",
    "no more than",
    "per minute",
    "seconds",
];

/// Specialty vocabularies; coverage counts how many specialties the text
/// touches at all, not how often.
const SPECIALTY_ASPECTS: &[&[&str]] = &[
    &["technical", "performance", "api", "integration"],
    &["usability", "user experience", "ux", "interface", "accessible"],
    &["business", "stakeholder", "value", "priority"],
    &["quality", "test", "testable", "measurable"],
];

/// Default quality scorer: three structural gates, then weighted keyword
/// signals. Any gate failure forces the score to 0 so non-conformant text
/// is never treated as high quality.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicQuality;

impl QualityScorer for HeuristicQuality {
    fn score(&self, candidate: &str) -> f64 {
        let first_line = candidate.lines().next().unwrap_or("");
        let opening_ok = candidate.starts_with(STORY_OPENING) && first_line.contains("so that");
        let header_ok = candidate.matches(CRITERIA_HEADER).count() == 1;

        let criteria = criteria_lines(candidate);
        let count_ok = (MIN_CRITERIA..=MAX_CRITERIA).contains(&criteria.len());

        if !(opening_ok && header_ok && count_ok) {
            return 0.0;
        }

        let mut score = W_OPENING + W_HEADER + W_COUNT;
        score += W_OBLIGATION * keyword_fraction(&criteria, OBLIGATION_KEYWORDS);
        score += W_MEASURABILITY * keyword_fraction(&criteria, MEASURABILITY_KEYWORDS);
        score += W_COVERAGE * aspect_coverage(candidate);
        score.min(1.0)
    }
}

/// Fraction of criteria lines containing at least one of the keywords.
fn keyword_fraction(criteria: &[&str], keywords: &[&str]) -> f64 {
    if criteria.is_empty() {
        return 0.0;
    }
    let hits = criteria
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            keywords.iter().any(|kw| lower.contains(kw))
        })
        .count();
    hits as f64 / criteria.len() as f64
}

/// Fraction of specialty aspects mentioned anywhere in the text.
fn aspect_coverage(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let covered = SPECIALTY_ASPECTS
        .iter()
        .filter(|aspect| aspect.iter().any(|kw| lower.contains(kw)))
        .count();
    covered as f64 / SPECIALTY_ASPECTS.len() as f64
}

// Confidence heuristic tuning. Base confidence grows with length up to the
// cap; hedges and assertions shift it; lexical diversity adds the rest.
const LENGTH_CAP: f64 = 0.6;
const LENGTH_DIVISOR: f64 = 120.0;
const HEDGE_PENALTY: f64 = 0.08;
const ASSERTIVE_BONUS: f64 = 0.08;
const DIVERSITY_WEIGHT: f64 = 0.25;

const HEDGING_PHRASES: &[&str] = &[
    "i am unsure",
    "i'm unsure",
    "it might be",
    "i think",
    "possibly",
    "perhaps",
    "not sure",
    "may be",
    "unclear",
];

const ASSERTIVE_PHRASES: &[&str] = &[
    "i am confident",
    "i'm confident",
    "certainly",
    "definitely",
    "clearly",
    "without doubt",
];

/// Default confidence scorer over raw agent prose. Deterministic and bounded
/// to [0, 1] for arbitrary input; empty text scores 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicConfidence;

impl ConfidenceScorer for HeuristicConfidence {
    fn confidence(&self, text: &str) -> f64 {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }

        let mut confidence = (words.len() as f64 / LENGTH_DIVISOR).min(LENGTH_CAP);

        let lower = text.to_lowercase();
        for phrase in HEDGING_PHRASES {
            confidence -= HEDGE_PENALTY * lower.matches(phrase).count() as f64;
        }
        for phrase in ASSERTIVE_PHRASES {
            confidence += ASSERTIVE_BONUS * lower.matches(phrase).count() as f64;
        }

        let unique: std::collections::HashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();
        confidence += DIVERSITY_WEIGHT * (unique.len() as f64 / words.len() as f64);

        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_STORY: &str = "As a user, I want to log in securely so that I can access my account.\n\n\
        Acceptance Criteria:\n\
        1. The login form must validate credentials against the technical authentication service.\n\
        2. Failed attempts must be tracked and limited to five per minute.\n\
        3. The usability of the flow should be measured through a quality survey owned by the business.";

    #[test]
    fn good_story_scores_high() {
        let score = HeuristicQuality.score(GOOD_STORY);
        assert!(score >= 0.8, "expected high score, got {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn score_is_deterministic() {
        let a = HeuristicQuality.score(GOOD_STORY);
        let b = HeuristicQuality.score(GOOD_STORY);
        assert_eq!(a, b);
    }

    #[test]
    fn opening_gate_forces_zero() {
        let story = GOOD_STORY.replace("As a user, I want", "We would like");
        assert_eq!(HeuristicQuality.score(&story), 0.0);
    }

    #[test]
    fn header_gate_forces_zero() {
        let story = GOOD_STORY.replace("Acceptance Criteria:", "Checklist:");
        assert_eq!(HeuristicQuality.score(&story), 0.0);
    }

    #[test]
    fn count_gate_forces_zero_despite_keywords() {
        // Keyword-rich but only two criteria: the gate must win.
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. Must be measured, tracked, technical, usability, business, quality.\n\
            2. Should be measurable within seconds.";
        assert_eq!(HeuristicQuality.score(story), 0.0);
    }

    #[test]
    fn gates_alone_give_base_score() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. Alpha beta.\n2. Gamma delta.\n3. Epsilon zeta.";
        let score = HeuristicQuality.score(story);
        assert!((score - 0.65).abs() < 1e-9, "base-only score was {score}");
    }

    #[test]
    fn empty_text_has_zero_confidence() {
        assert_eq!(HeuristicConfidence.confidence(""), 0.0);
        assert_eq!(HeuristicConfidence.confidence("   \n\t "), 0.0);
    }

    #[test]
    fn confidence_is_bounded_for_arbitrary_text() {
        let shouty = "definitely certainly clearly ".repeat(50);
        let long = "word ".repeat(5000);
        let samples: Vec<&str> = vec![
            "ok",
            "I am unsure, it might be possibly perhaps not sure unclear.",
            &shouty,
            &long,
            "\u{1F600} emoji only",
        ];
        for text in samples {
            let c = HeuristicConfidence.confidence(text);
            assert!((0.0..=1.0).contains(&c), "confidence {c} out of range for {text:?}");
        }
    }

    #[test]
    fn hedging_lowers_confidence_relative_to_assertive() {
        let hedged = "I am unsure about this, it might be the wrong approach, not sure.";
        let assertive = "I am confident in this approach, it is definitely the right one here.";
        assert!(
            HeuristicConfidence.confidence(hedged) < HeuristicConfidence.confidence(assertive)
        );
    }

    #[test]
    fn repetition_lowers_confidence() {
        let varied = "The login flow requires credential validation, session handling, and audit logging for traceability.";
        let repeated = "login login login login login login login login login login login login login login";
        assert!(
            HeuristicConfidence.confidence(repeated) < HeuristicConfidence.confidence(varied)
        );
    }
}
