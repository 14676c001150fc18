use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling goals-per-match proxies for one team.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    /// Goals scored per match
    pub attack_rate: f64,
    /// Goals conceded per match
    pub defense_rate: f64,
}

impl TeamForm {
    /// League-average fallback used when a team's record is unknown.
    pub const AVERAGE: TeamForm = TeamForm {
        attack_rate: 1.35,
        defense_rate: 1.35,
    };

    /// A team that scores freely or concedes freely.
    pub fn is_attacking(&self, threshold: f64) -> bool {
        self.attack_rate >= threshold || self.defense_rate >= threshold
    }
}

impl Default for TeamForm {
    fn default() -> Self {
        TeamForm::AVERAGE
    }
}

/// Home and away form for one fixture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchForms {
    pub home: TeamForm,
    pub away: TeamForm,
}

/// Provider-side identifiers used for follow-up lookups. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRefs {
    pub league_id: i64,
    pub season: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
}

/// In-progress fixture as fetched from the data provider. Immutable per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// External fixture ID from the data provider
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub minute: u32,
    pub home_goals: u32,
    pub away_goals: u32,
    pub home_form: TeamForm,
    pub away_form: TeamForm,
    #[serde(default)]
    pub refs: ProviderRefs,
}

impl Fixture {
    /// Copy of this fixture with team forms attached.
    pub fn with_forms(&self, forms: MatchForms) -> Fixture {
        Fixture {
            home_form: forms.home,
            away_form: forms.away,
            ..self.clone()
        }
    }

    /// Signed goal differential, home minus away.
    pub fn goal_diff(&self) -> i32 {
        i64::from(self.home_goals)
            .saturating_sub(i64::from(self.away_goals))
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn total_goals(&self) -> u32 {
        self.home_goals.saturating_add(self.away_goals)
    }

    /// The over/under line for "one more goal": current total + 0.5.
    pub fn total_goals_line(&self) -> f64 {
        self.total_goals() as f64 + 0.5
    }

    pub fn name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

/// Live per-team shot and attack counts for one fixture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub home_shots: u32,
    pub away_shots: u32,
    pub home_shots_on_target: u32,
    pub away_shots_on_target: u32,
    pub home_dangerous_attacks: u32,
    pub away_dangerous_attacks: u32,
}

impl StatisticsSnapshot {
    pub fn total_shots(&self) -> u32 {
        self.home_shots.saturating_add(self.away_shots)
    }

    pub fn total_shots_on_target(&self) -> u32 {
        self.home_shots_on_target.saturating_add(self.away_shots_on_target)
    }

    pub fn total_dangerous_attacks(&self) -> u32 {
        self.home_dangerous_attacks.saturating_add(self.away_dangerous_attacks)
    }
}

/// Pre-match signal derived from the provider's prediction data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PregameSignal {
    pub boost: f64,
    pub context_boost: f64,
    /// Pre-match strength ratings on a 0.0–1.0 scale
    pub rating_home: f64,
    pub rating_away: f64,
}

/// Enrichment signals for one fixture. Every field defaults to neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnrichmentContext {
    pub news_boost: Option<f64>,
    pub pregame_boost: Option<f64>,
    pub context_boost: Option<f64>,
    pub rating_home: Option<f64>,
    pub rating_away: Option<f64>,
}

impl EnrichmentContext {
    pub fn news(&self) -> f64 {
        neutral(self.news_boost)
    }

    pub fn pregame(&self) -> f64 {
        neutral(self.pregame_boost)
    }

    pub fn context(&self) -> f64 {
        neutral(self.context_boost)
    }

    /// Highest known pre-match rating of either side.
    pub fn best_rating(&self) -> Option<f64> {
        match (self.rating_home, self.rating_away) {
            (Some(h), Some(a)) => Some(h.max(a)),
            (h, a) => h.or(a),
        }
        .filter(|r| r.is_finite())
    }
}

fn neutral(v: Option<f64>) -> f64 {
    v.filter(|b| b.is_finite()).unwrap_or(0.0)
}

/// Derived per-fixture figures for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsBundle {
    /// Bounded [0, 10]
    pub pressure: f64,
    /// Bounded [0.25, 0.85]
    pub p_final: f64,
    /// Exactly 1 / p_final
    pub fair_odd: f64,
    /// Market odd when one was obtained
    pub market_odd: Option<f64>,
    /// Market odd, or the fair odd when no market odd exists
    pub odd_current: f64,
    /// p_final * odd_current − 1
    pub ev: f64,
    pub total_line: f64,
    pub pressure_term: f64,
    pub freshness_bonus: f64,
    pub news_boost: f64,
    pub pregame_boost: f64,
    pub context_boost: f64,
    pub momentum_boost: f64,
    pub high_line_malus: f64,
}

impl MetricsBundle {
    pub fn has_market_odd(&self) -> bool {
        self.market_odd.is_some()
    }
}

/// Alert render variant, selected by odds availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertVariant {
    /// Live market odd with positive EV
    Full,
    /// No market odd; fair-odd hint only
    Manual,
    /// Market odd below the actionable minimum
    Watch,
}

impl AlertVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertVariant::Full => "full",
            AlertVariant::Manual => "manual",
            AlertVariant::Watch => "watch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(AlertVariant::Full),
            "manual" => Some(AlertVariant::Manual),
            "watch" => Some(AlertVariant::Watch),
            _ => None,
        }
    }
}

/// An alert produced by a scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<i64>,
    pub fixture_id: String,
    pub fixture_name: String,
    pub variant: AlertVariant,
    pub minute: u32,
    pub home_goals: u32,
    pub away_goals: u32,
    pub pressure: f64,
    pub p_final: f64,
    pub odd: f64,
    pub ev: Option<f64>,
    /// Rendered message text
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fixture(home: u32, away: u32) -> Fixture {
        Fixture {
            id: "1".into(),
            league: "Premier League".into(),
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            minute: 50,
            home_goals: home,
            away_goals: away,
            home_form: TeamForm::AVERAGE,
            away_form: TeamForm::AVERAGE,
            refs: Default::default(),
        }
    }

    #[test]
    fn goal_diff_is_signed() {
        assert_eq!(fixture(0, 3).goal_diff(), -3);
        assert_eq!(fixture(2, 1).goal_diff(), 1);
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        assert_eq!(fixture(u32::MAX, 3).total_goals(), u32::MAX);
        assert_eq!(fixture(u32::MAX, 0).goal_diff(), i32::MAX);
        let s = StatisticsSnapshot {
            home_shots: u32::MAX,
            away_shots: 1,
            ..Default::default()
        };
        assert_eq!(s.total_shots(), u32::MAX);
    }

    #[test]
    fn total_line_is_next_goal() {
        assert_relative_eq!(fixture(2, 1).total_goals_line(), 3.5);
        assert_relative_eq!(fixture(0, 0).total_goals_line(), 0.5);
    }

    #[test]
    fn enrichment_defaults_to_neutral() {
        let ctx = EnrichmentContext::default();
        assert_eq!(ctx.news(), 0.0);
        assert_eq!(ctx.pregame(), 0.0);
        assert_eq!(ctx.context(), 0.0);
        assert!(ctx.best_rating().is_none());

        let ctx = EnrichmentContext {
            news_boost: Some(f64::NAN),
            rating_away: Some(0.7),
            ..Default::default()
        };
        assert_eq!(ctx.news(), 0.0);
        assert_eq!(ctx.best_rating(), Some(0.7));
    }

    #[test]
    fn attacking_profile_uses_either_rate() {
        let leaky = TeamForm {
            attack_rate: 0.9,
            defense_rate: 1.8,
        };
        assert!(leaky.is_attacking(1.5));
        assert!(!TeamForm::AVERAGE.is_attacking(1.5));
    }
}
