use super::ledger::keywords;
use crate::types::{AgentAction, PageObservation};

/// What a candidate is judged against.
pub struct ScoringContext<'a> {
    pub observation: &'a PageObservation,
    /// Signatures of recent actions, oldest first.
    pub recent_signatures: &'a [String],
    /// Keywords of outcomes not completed yet.
    pub pending_keywords: &'a [String],
}

const MAX_KEYWORD_BONUS: f32 = 3.0;

/// Heuristic score of one proposed action. Higher is better.
///
/// Components: target validity, plausibility of the expected signal,
/// novelty against recent history, overlap with pending goal keywords, and
/// the model's own confidence.
pub fn score_candidate(action: &AgentAction, ctx: &ScoringContext<'_>) -> f32 {
    let mut score = 0.0;

    if action.kind.requires_target() {
        match &action.target {
            Some(target) if target.is_usable() => {
                score += 2.0;
                if ctx
                    .observation
                    .elements
                    .iter()
                    .any(|e| !e.disabled && target.matches_element(e))
                {
                    score += 1.0;
                }
            }
            _ => score -= 3.0,
        }
    } else {
        score += 1.0;
    }

    let signal = action.expected_signal.trim();
    if signal.len() >= 8 {
        score += 1.0;
    } else if !signal.is_empty() {
        score += 0.5;
    }

    let signature = action.signature();
    if ctx.recent_signatures.last() == Some(&signature) {
        score -= 2.0;
    } else if ctx.recent_signatures.contains(&signature) {
        score -= 1.0;
    }

    let action_words = keywords(&action.keyword_text());
    let overlap = ctx
        .pending_keywords
        .iter()
        .filter(|k| action_words.contains(k))
        .count() as f32;
    score += overlap.min(MAX_KEYWORD_BONUS);

    score + action.confidence
}

/// Index and score of the best candidate. Ties keep the earliest proposal.
pub fn select_best(candidates: &[AgentAction], ctx: &ScoringContext<'_>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = score_candidate(candidate, ctx);
        log::debug!("Candidate {} '{}' scored {:.2}", index, candidate.signature(), score);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best
}
