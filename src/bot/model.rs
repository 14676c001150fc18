//! Pressure score and next-goal probability model.
//!
//! Two pure functions drive every alert decision:
//!
//! - [`pressure_score`]: three live counters (shots, shots on target,
//!   dangerous attacks) each mapped through a three-step ladder, summed and
//!   clamped to `[0, 10]`.
//! - [`final_probability`]: a fixed base, plus a pressure term, an early-window
//!   freshness bonus, the enrichment boosts and a capped momentum term, minus
//!   a malus for high total-goal lines. The result is clamped to
//!   `[P_MIN, P_MAX]` no matter how extreme the inputs are.

use serde::Serialize;

use crate::config::Config;
use crate::db::models::{EnrichmentContext, Fixture, StatisticsSnapshot};

pub const PRESSURE_MAX: f64 = 10.0;
pub const P_MIN: f64 = 0.25;
pub const P_MAX: f64 = 0.85;

/// Probability before any live evidence.
const BASE_PROBABILITY: f64 = 0.35;
/// Probability per pressure point (10 points → +0.25).
const PRESSURE_WEIGHT: f64 = 0.025;

// ── Pressure ─────────────────────────────────────────────────────────────────
//
// Ladders are (minimum count, points), ascending. The highest rung reached
// wins. Shots on target carry the heaviest top rung so a full house of
// on-target pressure can reach the 10-point ceiling.

const SHOTS_LADDER: [(u32, f64); 3] = [(10, 1.0), (16, 2.0), (22, 3.0)];
const ON_TARGET_LADDER: [(u32, f64); 3] = [(3, 1.0), (6, 2.0), (9, 4.0)];
const DANGEROUS_LADDER: [(u32, f64); 3] = [(40, 1.0), (70, 2.0), (100, 3.0)];

fn ladder_points(value: u32, ladder: &[(u32, f64); 3]) -> f64 {
    ladder
        .iter()
        .rev()
        .find(|(min, _)| value >= *min)
        .map(|(_, pts)| *pts)
        .unwrap_or(0.0)
}

/// Live match intensity on a `[0, 10]` scale.
pub fn pressure_score(stats: &StatisticsSnapshot) -> f64 {
    let raw = ladder_points(stats.total_shots(), &SHOTS_LADDER)
        + ladder_points(stats.total_shots_on_target(), &ON_TARGET_LADDER)
        + ladder_points(stats.total_dangerous_attacks(), &DANGEROUS_LADDER);
    raw.clamp(0.0, PRESSURE_MAX)
}

// ── Probability ──────────────────────────────────────────────────────────────

/// Tunables of the probability model.
#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    pub high_line_threshold: f64,
    pub high_line_malus: f64,
    pub momentum_cap: f64,
}

impl From<&Config> for ModelParams {
    fn from(cfg: &Config) -> Self {
        ModelParams {
            high_line_threshold: cfg.high_line_threshold,
            high_line_malus: cfg.high_line_malus,
            momentum_cap: cfg.momentum_cap,
        }
    }
}

/// Every additive component of the final probability, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbabilityBreakdown {
    pub p_final: f64,
    pub pressure_term: f64,
    pub freshness_bonus: f64,
    pub news_boost: f64,
    pub pregame_boost: f64,
    pub context_boost: f64,
    pub momentum_boost: f64,
    pub high_line_malus: f64,
}

/// Earlier in the window means more time for the goal to arrive.
pub fn freshness_bonus(minute: u32) -> f64 {
    match minute {
        0..=30 => 0.05,
        31..=55 => 0.03,
        56..=70 => 0.01,
        _ => 0.0,
    }
}

/// One `step` per whole goal the line sits above `threshold`.
pub fn high_line_malus(line: f64, threshold: f64, step: f64) -> f64 {
    if !(line > threshold) {
        return 0.0;
    }
    (line - threshold).ceil() * step.max(0.0)
}

/// Bounded momentum term. Each part is capped on its own; `cap` bounds the sum.
pub fn momentum_boost(fixture: &Fixture, pressure: f64, context_boost: f64, cap: f64) -> f64 {
    let pressure_tier = if pressure >= 7.0 {
        0.03
    } else if pressure >= 5.0 {
        0.015
    } else {
        0.0
    };
    let close_game = if fixture.goal_diff().abs() <= 1 { 0.015 } else { 0.0 };
    let scoreless_pressure = if fixture.total_goals() == 0 && pressure >= 5.0 {
        0.01
    } else {
        0.0
    };
    let mid_match = if (45..=75).contains(&fixture.minute) {
        0.01
    } else {
        0.0
    };
    let context_share = if context_boost.is_finite() {
        (context_boost * 0.5).clamp(0.0, 0.02)
    } else {
        0.0
    };

    (pressure_tier + close_game + scoreless_pressure + mid_match + context_share)
        .min(cap)
        .max(0.0)
}

/// Next-goal probability for a fixture, always inside `[P_MIN, P_MAX]`.
pub fn final_probability(
    fixture: &Fixture,
    pressure: f64,
    ctx: &EnrichmentContext,
    params: &ModelParams,
) -> ProbabilityBreakdown {
    let pressure = if pressure.is_finite() {
        pressure.clamp(0.0, PRESSURE_MAX)
    } else {
        0.0
    };
    let pressure_term = pressure * PRESSURE_WEIGHT;
    let freshness = freshness_bonus(fixture.minute);
    let (news, pregame, context) = (ctx.news(), ctx.pregame(), ctx.context());
    let momentum = momentum_boost(fixture, pressure, context, params.momentum_cap);
    let malus = high_line_malus(
        fixture.total_goals_line(),
        params.high_line_threshold,
        params.high_line_malus,
    );

    let raw = BASE_PROBABILITY + pressure_term + freshness + news + pregame + context + momentum
        - malus;
    let p_final = if raw.is_finite() {
        raw.clamp(P_MIN, P_MAX)
    } else {
        P_MIN
    };

    ProbabilityBreakdown {
        p_final,
        pressure_term,
        freshness_bonus: freshness,
        news_boost: news,
        pregame_boost: pregame,
        context_boost: context,
        momentum_boost: momentum,
        high_line_malus: malus,
    }
}
