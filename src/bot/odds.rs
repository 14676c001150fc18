/// Odds reconciliation.
///
/// The fair odd is the reciprocal of the model probability. When the market
/// quotes the next-goal line we price against that quote; otherwise we fall
/// back to the fair odd, which by construction carries zero EV.
///
/// EV per unit staked:
///   ev = p · odd − 1
use crate::bot::model::ProbabilityBreakdown;
use crate::db::models::MetricsBundle;

/// Decimal odd at which a bet on probability `p` breaks even.
pub fn fair_odd(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::INFINITY;
    }
    1.0 / p
}

/// Expected value per unit staked at decimal `odd`.
pub fn expected_value(p: f64, odd: f64) -> f64 {
    p * odd - 1.0
}

/// A quote is usable only if it is a finite decimal odd above evens-money floor.
fn usable_quote(odd: Option<f64>) -> Option<f64> {
    odd.filter(|o| o.is_finite() && *o > 1.0)
}

/// Merge the model output with the market quote into one metrics bundle.
pub fn reconcile(
    pressure: f64,
    total_line: f64,
    prob: &ProbabilityBreakdown,
    market_odd: Option<f64>,
) -> MetricsBundle {
    let p = prob.p_final;
    let fair = fair_odd(p);
    let market_odd = usable_quote(market_odd);
    let odd_current = market_odd.unwrap_or(fair);

    MetricsBundle {
        pressure,
        p_final: p,
        fair_odd: fair,
        market_odd,
        odd_current,
        ev: expected_value(p, odd_current),
        total_line,
        pressure_term: prob.pressure_term,
        freshness_bonus: prob.freshness_bonus,
        news_boost: prob.news_boost,
        pregame_boost: prob.pregame_boost,
        context_boost: prob.context_boost,
        momentum_boost: prob.momentum_boost,
        high_line_malus: prob.high_line_malus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn breakdown(p: f64) -> ProbabilityBreakdown {
        ProbabilityBreakdown {
            p_final: p,
            pressure_term: 0.0,
            freshness_bonus: 0.0,
            news_boost: 0.0,
            pregame_boost: 0.0,
            context_boost: 0.0,
            momentum_boost: 0.0,
            high_line_malus: 0.0,
        }
    }

    #[test]
    fn test_fair_odd_is_reciprocal() {
        assert_relative_eq!(fair_odd(0.5), 2.0);
        assert_relative_eq!(fair_odd(0.25), 4.0);
        assert_relative_eq!(fair_odd(0.62) * 0.62, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_market_odd_drives_ev() {
        let m = reconcile(8.0, 2.5, &breakdown(0.62), Some(1.85));
        assert_eq!(m.market_odd, Some(1.85));
        assert_relative_eq!(m.odd_current, 1.85);
        assert_relative_eq!(m.ev, 0.62 * 1.85 - 1.0, epsilon = 1e-12);
        assert!(m.ev > 0.0);
    }

    #[test]
    fn test_missing_odd_falls_back_to_fair() {
        let m = reconcile(8.0, 2.5, &breakdown(0.62), None);
        assert!(!m.has_market_odd());
        assert_relative_eq!(m.odd_current, m.fair_odd);
        assert_relative_eq!(m.ev, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unusable_quote_is_ignored() {
        for bad in [0.0, 1.0, -2.0, f64::NAN, f64::INFINITY] {
            let m = reconcile(5.0, 1.5, &breakdown(0.5), Some(bad));
            assert!(m.market_odd.is_none(), "{} should be dropped", bad);
            assert_relative_eq!(m.odd_current, 2.0);
        }
    }

    #[test]
    fn test_negative_ev_below_fair() {
        // p = 0.615, market 1.40 < fair 1.626
        let m = reconcile(8.0, 2.5, &breakdown(0.615), Some(1.40));
        assert!(m.ev < 0.0);
        assert!(m.odd_current < m.fair_odd);
    }
}
