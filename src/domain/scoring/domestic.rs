//! Domestic dual-momentum selection (§4.4 steps 1-5).

use super::{ScoreInput, apply_absolute_momentum_gate, blended_score};
use rust_decimal::Decimal;
use tracing::info;

/// 1. Liquidity universe (`adtv20 >= threshold`).
/// 2-3. 3/6/12-month blended score.
/// 4. Absolute-momentum gate (`score = None` when `r12 < risk_free_rate`).
/// 5. Sort descending, return the top `top_n` symbols.
///
/// `candidates` is `(symbol, ScoreInput)`; order is irrelevant to the
/// result (Scorer output is invariant under input-column permutation, §8).
pub fn select_domestic_assets(
    candidates: &[(String, ScoreInput)],
    adtv_threshold: Decimal,
    top_n: usize,
    risk_free_rate: Decimal,
) -> Vec<String> {
    let mut scored: Vec<(String, Decimal)> = candidates
        .iter()
        .filter(|(_, input)| input.adtv20.is_some_and(|v| v >= adtv_threshold))
        .filter_map(|(symbol, input)| {
            let score = blended_score(input);
            let gated = apply_absolute_momentum_gate(score, input.r12, risk_free_rate);
            gated.map(|s| (symbol.clone(), s))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let selected: Vec<String> = scored.into_iter().take(top_n).map(|(s, _)| s).collect();
    info!(n_candidates = candidates.len(), n_selected = selected.len(), "domestic selection complete");
    selected
}

/// One candidate's full diagnostic record from the non-truncating universe
/// pass (§4.4 `ScoreUniverse`, used by the Screener C10 to explain every
/// name's fate rather than just the winners).
#[derive(Debug, Clone)]
pub struct UniverseEntry {
    pub symbol: String,
    pub adtv20: Option<Decimal>,
    pub r3: Option<Decimal>,
    pub r6: Option<Decimal>,
    pub r12: Option<Decimal>,
    pub score: Option<Decimal>,
    pub passes: bool,
    /// Ascending rank (`1` = best) over `-score` restricted to passing rows;
    /// `None` for rows that did not pass.
    pub rank: Option<usize>,
    pub reason: String,
}

/// The non-truncating sibling of [`select_domestic_assets`]: same universe,
/// return, and gate columns, but every candidate is kept with a diagnostic
/// pass/fail reason instead of being cut to the Top-N winners (§4.4, §4.10).
pub fn score_universe(candidates: &[(String, ScoreInput)], adtv_threshold: Decimal, risk_free_rate: Decimal) -> Vec<UniverseEntry> {
    let mut entries: Vec<UniverseEntry> = candidates
        .iter()
        .map(|(symbol, input)| {
            let liquidity_ok = input.adtv20.is_some_and(|v| v >= adtv_threshold);
            let score = blended_score(input);
            let (passes, reason) = if !liquidity_ok {
                (false, format!("fails liquidity gate (adtv20={:?} below {adtv_threshold})", input.adtv20))
            } else if score.is_none() {
                (false, "insufficient history for 3/6/12-month return".to_string())
            } else if input.r12.is_some_and(|r12| r12 < risk_free_rate) {
                (false, format!("fails absolute momentum (12M return {:?} below risk-free rate {risk_free_rate})", input.r12))
            } else {
                (true, "passes all gates".to_string())
            };
            UniverseEntry {
                symbol: symbol.clone(),
                adtv20: input.adtv20,
                r3: input.r3,
                r6: input.r6,
                r12: input.r12,
                score,
                passes,
                rank: None,
                reason,
            }
        })
        .collect();

    let mut passing_indices: Vec<usize> = entries.iter().enumerate().filter(|(_, e)| e.passes).map(|(i, _)| i).collect();
    passing_indices.sort_by(|&a, &b| {
        entries[b].score.cmp(&entries[a].score).then_with(|| entries[a].symbol.cmp(&entries[b].symbol))
    });
    for (rank, idx) in passing_indices.into_iter().enumerate() {
        entries[idx].rank = Some(rank + 1);
    }
    entries
}
