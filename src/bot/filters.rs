//! Ordered gate cascade.
//!
//! Gates run in a fixed order and the first one that fires stops evaluation
//! for the fixture. The scanner calls them in stages because data is
//! fetched lazily between them:
//!
//! 1. [`in_window`] before anything is fetched (silent skip, never counted)
//! 2. [`pressure_gate`] once statistics are known, before any enrichment I/O
//! 3. [`scoring_gates`] once the probability is known: draw, blowout
//! 4. [`odds_gates`] once the market quote is reconciled: odd range, EV and
//!    the no-odds policy
//!
//! The cooldown gate comes last and lives in [`super::cooldown`] because it
//! mutates shared state.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::db::models::{EnrichmentContext, Fixture, MetricsBundle};

/// Named reason a fixture was stopped by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NoLiveData,
    PressureThreshold,
    DrawFilter,
    Goleada,
    OddThreshold,
    EvThreshold,
    Cooldown,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::NoLiveData => "no_live_data",
            BlockReason::PressureThreshold => "pressure_threshold",
            BlockReason::DrawFilter => "draw_filter",
            BlockReason::Goleada => "goleada",
            BlockReason::OddThreshold => "odd_threshold",
            BlockReason::EvThreshold => "ev_threshold",
            BlockReason::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cycle count of fixtures stopped by each reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockCounters {
    counts: BTreeMap<BlockReason, u32>,
}

impl BlockCounters {
    pub fn increment(&mut self, reason: BlockReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    #[cfg(test)]
    pub fn get(&self, reason: BlockReason) -> u32 {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn as_map(&self) -> BTreeMap<String, u32> {
        self.counts
            .iter()
            .map(|(r, n)| (r.as_str().to_string(), *n))
            .collect()
    }

    /// `"pressure_threshold=3, draw_filter=1"`, in cascade order, or `"none"`.
    pub fn summary(&self) -> String {
        if self.counts.is_empty() {
            return "none".to_string();
        }
        self.counts
            .iter()
            .map(|(r, n)| format!("{}={}", r, n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ── Window ───────────────────────────────────────────────────────────────────

/// `[window_start, window_end]`, both ends inclusive.
pub fn in_window(minute: u32, cfg: &Config) -> bool {
    (cfg.window_start..=cfg.window_end).contains(&minute)
}

// ── Scoring gates ────────────────────────────────────────────────────────────

pub fn pressure_gate(pressure: f64, cfg: &Config) -> Option<BlockReason> {
    if pressure < cfg.min_pressure {
        Some(BlockReason::PressureThreshold)
    } else {
        None
    }
}

/// Which permissive draw condition let a level fixture through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawQualifier {
    HighPressure,
    AttackingProfiles,
    PositiveContext,
    LatePressure,
    StrongRating,
    HighProbability,
}

/// Every draw condition the fixture satisfies, in evaluation order.
pub fn draw_qualifiers(
    fixture: &Fixture,
    pressure: f64,
    p_final: f64,
    ctx: &EnrichmentContext,
    cfg: &Config,
) -> Vec<DrawQualifier> {
    let mut out = Vec::new();
    if pressure >= cfg.draw_high_pressure {
        out.push(DrawQualifier::HighPressure);
    }
    if fixture.home_form.is_attacking(cfg.attacking_rate)
        && fixture.away_form.is_attacking(cfg.attacking_rate)
    {
        out.push(DrawQualifier::AttackingProfiles);
    }
    if ctx.context() > cfg.draw_context_min {
        out.push(DrawQualifier::PositiveContext);
    }
    if fixture.minute >= cfg.draw_late_minute && pressure >= cfg.draw_moderate_pressure {
        out.push(DrawQualifier::LatePressure);
    }
    if ctx.best_rating().is_some_and(|r| r > cfg.draw_rating_min) {
        out.push(DrawQualifier::StrongRating);
    }
    if p_final >= cfg.draw_high_probability {
        out.push(DrawQualifier::HighProbability);
    }
    out
}

/// Blocks only level fixtures that satisfy none of the draw conditions.
pub fn draw_gate(
    fixture: &Fixture,
    pressure: f64,
    p_final: f64,
    ctx: &EnrichmentContext,
    cfg: &Config,
) -> Option<BlockReason> {
    if fixture.goal_diff() != 0 {
        return None;
    }
    if draw_qualifiers(fixture, pressure, p_final, ctx, cfg).is_empty() {
        Some(BlockReason::DrawFilter)
    } else {
        None
    }
}

/// Both conditions must hold: a wide margin and a late minute.
pub fn blowout_gate(fixture: &Fixture, cfg: &Config) -> Option<BlockReason> {
    let margin = fixture.goal_diff().unsigned_abs();
    if margin >= cfg.blowout_goals && fixture.minute >= cfg.blowout_minute {
        Some(BlockReason::Goleada)
    } else {
        None
    }
}

/// Draw then blowout.
pub fn scoring_gates(
    fixture: &Fixture,
    pressure: f64,
    p_final: f64,
    ctx: &EnrichmentContext,
    cfg: &Config,
) -> Option<BlockReason> {
    draw_gate(fixture, pressure, p_final, ctx, cfg).or_else(|| blowout_gate(fixture, cfg))
}

// ── Odds gates ───────────────────────────────────────────────────────────────

/// Outcome of the odds-dependent part of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsVerdict {
    /// Continue to the cooldown gate.
    Pass,
    /// Odd under the minimum with watch alerts on: emit a watch alert, stop.
    Watch,
    Block(BlockReason),
    /// No market odd and alerts without odds are disabled. Not counted.
    SkipNoOdds,
}

pub fn odds_gates(metrics: &MetricsBundle, cfg: &Config) -> OddsVerdict {
    let Some(odd) = metrics.market_odd else {
        return if cfg.allow_no_odds_alerts {
            OddsVerdict::Pass
        } else {
            OddsVerdict::SkipNoOdds
        };
    };

    if odd < cfg.min_odd {
        return if cfg.watch_alerts {
            OddsVerdict::Watch
        } else {
            OddsVerdict::Block(BlockReason::OddThreshold)
        };
    }
    if odd > cfg.max_odd {
        return OddsVerdict::Block(BlockReason::OddThreshold);
    }
    if metrics.ev < cfg.min_ev {
        return OddsVerdict::Block(BlockReason::EvThreshold);
    }
    OddsVerdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::model::ProbabilityBreakdown;
    use crate::bot::odds::reconcile;
    use crate::config::test_config;
    use crate::db::models::TeamForm;

    fn fixture(minute: u32, home: u32, away: u32) -> Fixture {
        Fixture {
            id: "42".into(),
            league: "La Liga".into(),
            home_team: "Betis".into(),
            away_team: "Sevilla".into(),
            minute,
            home_goals: home,
            away_goals: away,
            home_form: TeamForm::AVERAGE,
            away_form: TeamForm::AVERAGE,
            refs: Default::default(),
        }
    }

    fn metrics(p: f64, market: Option<f64>) -> MetricsBundle {
        let prob = ProbabilityBreakdown {
            p_final: p,
            pressure_term: 0.0,
            freshness_bonus: 0.0,
            news_boost: 0.0,
            pregame_boost: 0.0,
            context_boost: 0.0,
            momentum_boost: 0.0,
            high_line_malus: 0.0,
        };
        reconcile(6.0, 2.5, &prob, market)
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let cfg = test_config();
        assert!(in_window(cfg.window_start, &cfg));
        assert!(in_window(cfg.window_end, &cfg));
        assert!(!in_window(cfg.window_start - 1, &cfg));
        assert!(!in_window(cfg.window_end + 1, &cfg));
    }

    #[test]
    fn pressure_gate_uses_minimum_inclusively() {
        let cfg = test_config();
        assert_eq!(pressure_gate(cfg.min_pressure - 0.5, &cfg), Some(BlockReason::PressureThreshold));
        assert_eq!(pressure_gate(cfg.min_pressure, &cfg), None);
    }

    #[test]
    fn draw_passes_on_attacking_profiles() {
        // pressure 8.0, minute 60, level, both teams attacking
        let mut cfg = test_config();
        let mut f = fixture(60, 1, 1);
        f.home_form = TeamForm { attack_rate: 1.9, defense_rate: 1.1 };
        f.away_form = TeamForm { attack_rate: 1.2, defense_rate: 1.7 };
        let ctx = EnrichmentContext::default();

        let q = draw_qualifiers(&f, 8.0, 0.6, &ctx, &cfg);
        assert!(q.contains(&DrawQualifier::AttackingProfiles));
        assert_eq!(draw_gate(&f, 8.0, 0.6, &ctx, &cfg), None);

        // Still passes with every other condition switched off.
        cfg.draw_high_pressure = 99.0;
        cfg.draw_late_minute = 99;
        cfg.draw_high_probability = 0.99;
        assert_eq!(draw_qualifiers(&f, 8.0, 0.6, &ctx, &cfg), vec![DrawQualifier::AttackingProfiles]);
        assert_eq!(draw_gate(&f, 8.0, 0.6, &ctx, &cfg), None);
    }

    #[test]
    fn quiet_draw_is_blocked() {
        let cfg = test_config();
        let out = scoring_gates(&fixture(35, 0, 0), 4.5, 0.5, &EnrichmentContext::default(), &cfg);
        assert_eq!(out, Some(BlockReason::DrawFilter));
    }

    #[test]
    fn draw_gate_ignores_non_level_scores() {
        let cfg = test_config();
        let ctx = EnrichmentContext::default();
        for (h, a) in [(1, 0), (0, 1), (3, 1)] {
            assert_eq!(draw_gate(&fixture(35, h, a), 4.0, 0.3, &ctx, &cfg), None);
        }
    }

    #[test]
    fn draw_passes_on_rating_or_context() {
        let cfg = test_config();
        let f = fixture(35, 0, 0);
        let rated = EnrichmentContext {
            rating_home: Some(0.4),
            rating_away: Some(0.65),
            ..Default::default()
        };
        assert_eq!(draw_gate(&f, 4.5, 0.5, &rated, &cfg), None);

        let context = EnrichmentContext {
            context_boost: Some(0.025),
            ..Default::default()
        };
        assert_eq!(draw_gate(&f, 4.5, 0.5, &context, &cfg), None);
    }

    #[test]
    fn late_blowout_is_goleada() {
        let cfg = test_config();
        let out = scoring_gates(&fixture(70, 0, 5), 6.0, 0.5, &EnrichmentContext::default(), &cfg);
        assert_eq!(out, Some(BlockReason::Goleada));
    }

    #[test]
    fn early_blowout_is_not_blocked() {
        let cfg = test_config();
        assert_eq!(blowout_gate(&fixture(55, 5, 0), &cfg), None);
        assert_eq!(blowout_gate(&fixture(75, 3, 0), &cfg), None);
    }

    #[test]
    fn low_odd_emits_watch_when_enabled() {
        let mut cfg = test_config();
        let m = metrics(0.62, Some(1.30));
        assert_eq!(odds_gates(&m, &cfg), OddsVerdict::Watch);

        cfg.watch_alerts = false;
        assert_eq!(odds_gates(&m, &cfg), OddsVerdict::Block(BlockReason::OddThreshold));
    }

    #[test]
    fn high_odd_and_low_ev_block() {
        let cfg = test_config();
        assert_eq!(
            odds_gates(&metrics(0.5, Some(4.0)), &cfg),
            OddsVerdict::Block(BlockReason::OddThreshold)
        );
        // 0.5 * 2.02 - 1 = 0.01 < 0.02
        assert_eq!(
            odds_gates(&metrics(0.5, Some(2.02)), &cfg),
            OddsVerdict::Block(BlockReason::EvThreshold)
        );
        assert_eq!(odds_gates(&metrics(0.6, Some(1.85)), &cfg), OddsVerdict::Pass);
    }

    #[test]
    fn missing_odd_follows_policy_and_never_hits_ev() {
        let mut cfg = test_config();
        let m = metrics(0.6, None);
        assert_eq!(odds_gates(&m, &cfg), OddsVerdict::SkipNoOdds);
        cfg.allow_no_odds_alerts = true;
        cfg.min_ev = 0.5;
        assert_eq!(odds_gates(&m, &cfg), OddsVerdict::Pass);
    }

    #[test]
    fn counters_summarise_in_cascade_order() {
        let mut c = BlockCounters::default();
        assert_eq!(c.summary(), "none");
        c.increment(BlockReason::Cooldown);
        c.increment(BlockReason::PressureThreshold);
        c.increment(BlockReason::PressureThreshold);
        assert_eq!(c.get(BlockReason::PressureThreshold), 2);
        assert_eq!(c.total(), 3);
        assert_eq!(c.summary(), "pressure_threshold=2, cooldown=1");
    }
}
