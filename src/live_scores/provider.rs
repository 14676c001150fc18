use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Fixture, MatchForms, PregameSignal, StatisticsSnapshot};

/// Live fixture data: the fixture list, per-fixture statistics and odds.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Return a snapshot of all currently in-progress fixtures.
    async fn list_live_fixtures(&self) -> Result<Vec<Fixture>>;

    /// Shot/attack counts, or `None` when the provider has none for this fixture.
    async fn get_statistics(&self, fixture_id: &str) -> Result<Option<StatisticsSnapshot>>;

    /// Decimal odd for "over `total_goals_line`", if a live market exists.
    async fn get_market_odd(&self, fixture_id: &str, total_goals_line: f64)
        -> Result<Option<f64>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Contextual news sentiment expressed as a probability boost.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn get_news_boost(&self, fixture: &Fixture) -> Result<Option<f64>>;
}

/// Pre-match prediction data.
#[async_trait]
pub trait PregameSource: Send + Sync {
    async fn get_pregame_signal(&self, fixture: &Fixture) -> Result<Option<PregameSignal>>;
}

/// Probability delta from missing or returning players.
#[async_trait]
pub trait PlayerImpactSource: Send + Sync {
    async fn get_player_impact(&self, fixture: &Fixture) -> Result<Option<f64>>;
}

/// Rolling attack/defense rates for both teams of a fixture.
#[async_trait]
pub trait TeamFormSource: Send + Sync {
    async fn get_team_forms(&self, fixture: &Fixture) -> Result<Option<MatchForms>>;
}

/// Source that never has data. Stands in for unconfigured collaborators.
pub struct NullSource;

#[async_trait]
impl FixtureSource for NullSource {
    async fn list_live_fixtures(&self) -> Result<Vec<Fixture>> {
        Ok(Vec::new())
    }

    async fn get_statistics(&self, _fixture_id: &str) -> Result<Option<StatisticsSnapshot>> {
        Ok(None)
    }

    async fn get_market_odd(&self, _fixture_id: &str, _line: f64) -> Result<Option<f64>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[async_trait]
impl NewsSource for NullSource {
    async fn get_news_boost(&self, _fixture: &Fixture) -> Result<Option<f64>> {
        Ok(None)
    }
}

#[async_trait]
impl PregameSource for NullSource {
    async fn get_pregame_signal(&self, _fixture: &Fixture) -> Result<Option<PregameSignal>> {
        Ok(None)
    }
}

#[async_trait]
impl PlayerImpactSource for NullSource {
    async fn get_player_impact(&self, _fixture: &Fixture) -> Result<Option<f64>> {
        Ok(None)
    }
}

#[async_trait]
impl TeamFormSource for NullSource {
    async fn get_team_forms(&self, _fixture: &Fixture) -> Result<Option<MatchForms>> {
        Ok(None)
    }
}
