use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::models::{
    Alert, AlertVariant, EnrichmentContext, Fixture, MatchForms, PregameSignal,
};
use crate::db::Database;
use crate::live_scores::{
    with_retry, FixtureSource, NewsSource, PlayerImpactSource, PregameSource, RetryPolicy,
    TeamFormSource,
};
use crate::notify::NotificationSink;

use super::alert;
use super::cooldown::{CooldownKey, CooldownStore};
use super::enrichment::{EnrichmentCache, SourceOutcome, TtlPolicy};
use super::filters::{self, BlockCounters, BlockReason, OddsVerdict};
use super::model::{self, ModelParams};
use super::odds;

/// Bound on pregame context plus player impact.
const MAX_CONTEXT_BOOST: f64 = 0.03;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan disabled: {0}")]
    ConfigMissing(String),
    #[error("fixture list unavailable: {0:#}")]
    FixtureList(anyhow::Error),
    #[error("fixture {fixture_id} failed: {reason}")]
    Fixture { fixture_id: String, reason: String },
}

/// Where the most recent cycle is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Fetching,
    Evaluating,
    Summarizing,
}

/// Last-cycle statistics exposed to the dashboard and the summary message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatus {
    pub cycle: u64,
    pub phase: ScanPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub fixtures_seen: usize,
    pub fixtures_in_window: usize,
    pub alerts_full: u32,
    pub alerts_manual: u32,
    pub alerts_watch: u32,
    /// Fixtures whose evaluation failed unexpectedly
    pub errors: u32,
    pub blocks: BTreeMap<String, u32>,
    pub block_summary: String,
    pub message: String,
}

impl ScanStatus {
    pub fn alerts_total(&self) -> u32 {
        self.alerts_full + self.alerts_manual + self.alerts_watch
    }
}

/// What one cycle produced, returned to the on-demand trigger.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub alerts: Vec<Alert>,
    pub block_summary: String,
    pub message: String,
}

/// The collaborators a scanner reads from.
#[derive(Clone)]
pub struct Sources {
    pub fixtures: Arc<dyn FixtureSource>,
    pub news: Arc<dyn NewsSource>,
    pub pregame: Arc<dyn PregameSource>,
    pub players: Arc<dyn PlayerImpactSource>,
    pub team_forms: Arc<dyn TeamFormSource>,
}

/// One TTL cache per enrichment source.
#[derive(Clone)]
pub struct EnrichmentCaches {
    pub news: EnrichmentCache<f64>,
    pub pregame: EnrichmentCache<PregameSignal>,
    pub players: EnrichmentCache<f64>,
    pub team_forms: EnrichmentCache<MatchForms>,
}

impl EnrichmentCaches {
    pub fn from_config(cfg: &Config) -> Self {
        let negative = cfg.negative_ttl();
        let policy = |secs: i64| TtlPolicy::new(chrono::Duration::seconds(secs), negative);
        EnrichmentCaches {
            news: EnrichmentCache::new("news", policy(cfg.news_ttl_secs)),
            pregame: EnrichmentCache::new("pregame", policy(cfg.pregame_ttl_secs)),
            players: EnrichmentCache::new("player_impact", policy(cfg.player_ttl_secs)),
            team_forms: EnrichmentCache::new("team_form", policy(cfg.team_form_ttl_secs)),
        }
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        self.news.purge_stale(now).await
            + self.pregame.purge_stale(now).await
            + self.players.purge_stale(now).await
            + self.team_forms.purge_stale(now).await
    }
}

#[derive(Debug)]
enum Decision {
    OutsideWindow,
    Blocked(BlockReason),
    /// Qualified but nothing actionable to send. Not counted.
    Skipped,
    Alert(Alert),
}

/// Drives scan cycles. Shared between the periodic loop and the on-demand
/// trigger; the cooldown store is the only state both paths mutate.
pub struct Scanner {
    config: Config,
    params: ModelParams,
    retry: RetryPolicy,
    sources: Sources,
    caches: EnrichmentCaches,
    cooldowns: CooldownStore,
    sink: Arc<dyn NotificationSink>,
    /// Alert log; absent when the database could not be opened
    db: Option<Database>,
    status: Arc<RwLock<ScanStatus>>,
    cycle_seq: AtomicU64,
    disabled_reason: Option<String>,
}

impl Scanner {
    pub fn new(
        config: Config,
        sources: Sources,
        caches: EnrichmentCaches,
        sink: Arc<dyn NotificationSink>,
        db: Option<Database>,
    ) -> Self {
        let disabled_reason = config.scan_disabled_reason();
        let message = match &disabled_reason {
            Some(reason) => ScanError::ConfigMissing(reason.clone()).to_string(),
            None => "waiting for first cycle".to_string(),
        };
        Scanner {
            params: ModelParams::from(&config),
            retry: RetryPolicy::new(config.request_timeout(), config.request_retries),
            config,
            sources,
            caches,
            cooldowns: CooldownStore::new(),
            sink,
            db,
            status: Arc::new(RwLock::new(ScanStatus {
                block_summary: "none".to_string(),
                message,
                ..Default::default()
            })),
            cycle_seq: AtomicU64::new(0),
            disabled_reason,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled_reason.is_none()
    }

    pub fn caches(&self) -> &EnrichmentCaches {
        &self.caches
    }

    pub fn db(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    pub async fn status(&self) -> ScanStatus {
        self.status.read().await.clone()
    }

    async fn set_phase(&self, phase: ScanPhase) {
        self.status.write().await.phase = phase;
    }

    /// Run cycles every `period` until `shutdown` flips. A cycle in flight
    /// when the signal arrives runs to completion first.
    pub async fn run_periodic(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scan loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Run one full cycle: fetch, evaluate every fixture in parallel, emit,
    /// summarise. Never fails; problems end up in the returned report and
    /// in [`ScanStatus`].
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let cycle = self.cycle_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let clock = Instant::now();

        if let Some(reason) = &self.disabled_reason {
            let message = ScanError::ConfigMissing(reason.clone()).to_string();
            warn!("Cycle #{} skipped: {}", cycle, message);
            return self
                .finish_without_fixtures(cycle, started_at, clock, 0, message)
                .await;
        }

        self.set_phase(ScanPhase::Fetching).await;
        let source = &self.sources.fixtures;
        let fixtures = match with_retry("fixture list", self.retry, || source.list_live_fixtures()).await
        {
            Ok(fixtures) => fixtures,
            Err(e) => {
                let message = ScanError::FixtureList(e).to_string();
                error!("Cycle #{} from {}: {}", cycle, source.name(), message);
                return self
                    .finish_without_fixtures(cycle, started_at, clock, 1, message)
                    .await;
            }
        };

        self.set_phase(ScanPhase::Evaluating).await;
        let fixtures_seen = fixtures.len();
        let fixtures_in_window = fixtures
            .iter()
            .filter(|f| filters::in_window(f.minute, &self.config))
            .count();

        // One task per fixture: a panic inside one evaluation surfaces as a
        // JoinError for that fixture only.
        let (ids, handles): (Vec<_>, Vec<_>) = fixtures
            .into_iter()
            .map(|fixture| {
                let scanner = Arc::clone(self);
                let id = fixture.id.clone();
                let handle =
                    tokio::spawn(async move { scanner.evaluate_fixture(&fixture, started_at).await });
                (id, handle)
            })
            .unzip();

        let mut counters = BlockCounters::default();
        let mut alerts = Vec::new();
        let mut errors = 0u32;
        for (fixture_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            let outcome = joined
                .map_err(|e| ScanError::Fixture {
                    fixture_id: fixture_id.clone(),
                    reason: e.to_string(),
                })
                .and_then(|r| r);
            match outcome {
                Ok(Decision::Alert(a)) => alerts.push(a),
                Ok(Decision::Blocked(reason)) => counters.increment(reason),
                Ok(Decision::OutsideWindow) | Ok(Decision::Skipped) => {}
                Err(e) => {
                    errors += 1;
                    warn!("Cycle #{}: {}", cycle, e);
                }
            }
        }

        for a in alerts.iter_mut() {
            self.emit(a).await;
        }

        self.set_phase(ScanPhase::Summarizing).await;
        let count = |v: AlertVariant| alerts.iter().filter(|a| a.variant == v).count() as u32;
        let status = ScanStatus {
            cycle,
            phase: ScanPhase::Idle,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            duration_ms: clock.elapsed().as_millis() as u64,
            fixtures_seen,
            fixtures_in_window,
            alerts_full: count(AlertVariant::Full),
            alerts_manual: count(AlertVariant::Manual),
            alerts_watch: count(AlertVariant::Watch),
            errors,
            blocks: counters.as_map(),
            block_summary: counters.summary(),
            message: format!(
                "cycle #{}: {} alert(s) from {} live fixture(s)",
                cycle,
                alerts.len(),
                fixtures_seen
            ),
        };
        info!(
            "🔎 Cycle #{} done in {}ms: {} live, {} in window, {} alert(s), {} error(s), {} blocked ({})",
            cycle,
            status.duration_ms,
            fixtures_seen,
            fixtures_in_window,
            alerts.len(),
            errors,
            counters.total(),
            status.block_summary
        );

        if self.config.notify_cycle_summary {
            if let Err(e) = self.sink.send(&alert::render_summary(&status)).await {
                warn!("Cycle summary via {} failed: {:#}", self.sink.name(), e);
            }
        }

        let purged = self.caches.purge_stale(Utc::now()).await;
        if purged > 0 {
            debug!("Purged {} stale enrichment entries", purged);
        }

        let report = CycleReport {
            cycle,
            alerts,
            block_summary: status.block_summary.clone(),
            message: status.message.clone(),
        };
        *self.status.write().await = status;
        report
    }

    async fn finish_without_fixtures(
        &self,
        cycle: u64,
        started_at: DateTime<Utc>,
        clock: Instant,
        errors: u32,
        message: String,
    ) -> CycleReport {
        let status = ScanStatus {
            cycle,
            phase: ScanPhase::Idle,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            duration_ms: clock.elapsed().as_millis() as u64,
            errors,
            block_summary: "none".to_string(),
            message: message.clone(),
            ..Default::default()
        };
        *self.status.write().await = status;
        CycleReport {
            cycle,
            alerts: Vec::new(),
            block_summary: "none".to_string(),
            message,
        }
    }

    /// Log, persist and send one alert. Failures are logged and swallowed.
    async fn emit(&self, a: &mut Alert) {
        info!(
            "🔔 {} alert: {} {}' {}-{} pressure={:.1} p={:.3} odd={:.2}",
            a.variant.as_str(),
            a.fixture_name,
            a.minute,
            a.home_goals,
            a.away_goals,
            a.pressure,
            a.p_final,
            a.odd
        );
        if let Some(db) = &self.db {
            match db.insert_alert(a) {
                Ok(id) => a.id = Some(id),
                Err(e) => warn!("Failed to log alert for {}: {:#}", a.fixture_id, e),
            }
        }
        if let Err(e) = self.sink.send(&a.text).await {
            warn!("Alert via {} failed for {}: {:#}", self.sink.name(), a.fixture_id, e);
        }
    }

    fn block(&self, fixture: &Fixture, reason: BlockReason) -> Decision {
        debug!("{} [{}] blocked: {}", fixture.name(), fixture.id, reason);
        Decision::Blocked(reason)
    }

    async fn evaluate_fixture(&self, fixture: &Fixture, now: DateTime<Utc>) -> Result<Decision, ScanError> {
        let cfg = &self.config;
        if !filters::in_window(fixture.minute, cfg) {
            return Ok(Decision::OutsideWindow);
        }

        let source = &self.sources.fixtures;
        let stats = match with_retry("statistics", self.retry, || source.get_statistics(&fixture.id)).await {
            Ok(Some(stats)) => stats,
            Ok(None) => return Ok(self.block(fixture, BlockReason::NoLiveData)),
            Err(e) => {
                warn!("Statistics unavailable for {}: {:#}", fixture.name(), e);
                return Ok(self.block(fixture, BlockReason::NoLiveData));
            }
        };

        let pressure = model::pressure_score(&stats);
        if let Some(reason) = filters::pressure_gate(pressure, cfg) {
            return Ok(self.block(fixture, reason));
        }

        let (forms, ctx) = futures_util::join!(self.team_forms(fixture), self.enrich(fixture));
        let fixture = &fixture.with_forms(forms);
        let prob = model::final_probability(fixture, pressure, &ctx, &self.params);
        if let Some(reason) = filters::scoring_gates(fixture, pressure, prob.p_final, &ctx, cfg) {
            return Ok(self.block(fixture, reason));
        }

        let line = fixture.total_goals_line();
        let market_odd = match with_retry("market odd", self.retry, || {
            source.get_market_odd(&fixture.id, line)
        })
        .await
        {
            Ok(odd) => odd,
            Err(e) => {
                warn!("Odds unavailable for {}: {:#}", fixture.name(), e);
                None
            }
        };

        let metrics = odds::reconcile(pressure, line, &prob, market_odd);
        if !metrics.fair_odd.is_finite() || !metrics.ev.is_finite() {
            return Err(ScanError::Fixture {
                fixture_id: fixture.id.clone(),
                reason: format!("non-finite metrics {:?}", metrics),
            });
        }
        debug!(
            "{} [{}] pressure={:.1} p={:.3} fair={:.2} odd={:?} ev={:.3}",
            fixture.name(),
            fixture.id,
            metrics.pressure,
            metrics.p_final,
            metrics.fair_odd,
            metrics.market_odd,
            metrics.ev
        );

        match filters::odds_gates(&metrics, cfg) {
            OddsVerdict::Pass => {}
            OddsVerdict::Watch => {
                return Ok(Decision::Alert(alert::build_alert(
                    AlertVariant::Watch,
                    fixture,
                    &metrics,
                    cfg.min_odd,
                    now,
                )));
            }
            OddsVerdict::Block(reason) => return Ok(self.block(fixture, reason)),
            OddsVerdict::SkipNoOdds => {
                debug!("{} [{}] skipped: no market odd", fixture.name(), fixture.id);
                return Ok(Decision::Skipped);
            }
        }

        let key = CooldownKey::for_fixture(fixture);
        if !self
            .cooldowns
            .check_and_record(key, now, cfg.cooldown_window())
            .await
        {
            return Ok(self.block(fixture, BlockReason::Cooldown));
        }

        let variant = if metrics.has_market_odd() {
            AlertVariant::Full
        } else {
            AlertVariant::Manual
        };
        Ok(Decision::Alert(alert::build_alert(
            variant, fixture, &metrics, cfg.min_odd, now,
        )))
    }

    /// Pregame signal for a fixture through its cache. Also used by warm-up.
    pub async fn pregame_signal(&self, fixture: &Fixture) -> SourceOutcome<PregameSignal> {
        let (retry, source) = (self.retry, &self.sources.pregame);
        self.caches
            .pregame
            .get(&fixture.id, || {
                with_retry("pregame", retry, || source.get_pregame_signal(fixture))
            })
            .await
    }

    /// Team forms through their own cache and retry budget; league average
    /// when the source has nothing or fails.
    async fn team_forms(&self, fixture: &Fixture) -> MatchForms {
        let (retry, source) = (self.retry, &self.sources.team_forms);
        self.caches
            .team_forms
            .get(&fixture.id, || {
                with_retry("team form", retry, || source.get_team_forms(fixture))
            })
            .await
            .into_option()
            .unwrap_or_default()
    }

    /// All enrichment lookups for a fixture, concurrently. Never fails.
    async fn enrich(&self, fixture: &Fixture) -> EnrichmentContext {
        let retry = self.retry;
        let (news_src, player_src) = (&self.sources.news, &self.sources.players);
        let news = self.caches.news.get(&fixture.id, || {
            with_retry("news", retry, || news_src.get_news_boost(fixture))
        });
        let players = self.caches.players.get(&fixture.id, || {
            with_retry("player impact", retry, || player_src.get_player_impact(fixture))
        });
        let (news, pregame, players) =
            futures_util::join!(news, self.pregame_signal(fixture), players);
        build_context(news, pregame, players)
    }

    /// Fetch the live fixture list for warm-up; errors propagate.
    pub async fn live_fixtures(&self) -> anyhow::Result<Vec<Fixture>> {
        let source = &self.sources.fixtures;
        with_retry("fixture list", self.retry, || source.list_live_fixtures()).await
    }
}

/// Fold per-source outcomes into the model's context. Anything not
/// `Available` stays `None` and is read as neutral.
pub fn build_context(
    news: SourceOutcome<f64>,
    pregame: SourceOutcome<PregameSignal>,
    players: SourceOutcome<f64>,
) -> EnrichmentContext {
    let pregame = pregame.into_option();
    let players = players.into_option();
    let context_boost = match (pregame.map(|p| p.context_boost), players) {
        (None, None) => None,
        (ctx, impact) => Some(
            (ctx.unwrap_or(0.0) + impact.unwrap_or(0.0))
                .clamp(-MAX_CONTEXT_BOOST, MAX_CONTEXT_BOOST),
        ),
    };
    EnrichmentContext {
        news_boost: news.into_option(),
        pregame_boost: pregame.map(|p| p.boost),
        context_boost,
        rating_home: pregame.map(|p| p.rating_home),
        rating_away: pregame.map(|p| p.rating_away),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::models::{StatisticsSnapshot, TeamForm};
    use crate::live_scores::NullSource;
    use anyhow::Result;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFeed {
        fixtures: Mutex<Vec<Fixture>>,
        stats: HashMap<String, StatisticsSnapshot>,
        odds: HashMap<String, f64>,
        fail_list: bool,
        list_calls: AtomicU32,
    }

    #[async_trait]
    impl FixtureSource for FakeFeed {
        async fn list_live_fixtures(&self) -> Result<Vec<Fixture>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list {
                anyhow::bail!("upstream 502");
            }
            Ok(self.fixtures.lock().unwrap().clone())
        }

        async fn get_statistics(&self, fixture_id: &str) -> Result<Option<StatisticsSnapshot>> {
            Ok(self.stats.get(fixture_id).copied())
        }

        async fn get_market_odd(&self, fixture_id: &str, _line: f64) -> Result<Option<f64>> {
            Ok(self.odds.get(fixture_id).copied())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct BrokenNews;

    /// Team-form source that never answers.
    struct StalledForms;

    #[async_trait]
    impl TeamFormSource for StalledForms {
        async fn get_team_forms(&self, _fixture: &Fixture) -> Result<Option<MatchForms>> {
            std::future::pending().await
        }
    }

    struct AttackingForms;

    #[async_trait]
    impl TeamFormSource for AttackingForms {
        async fn get_team_forms(&self, _fixture: &Fixture) -> Result<Option<MatchForms>> {
            let open = TeamForm {
                attack_rate: 1.9,
                defense_rate: 1.6,
            };
            Ok(Some(MatchForms {
                home: open,
                away: open,
            }))
        }
    }

    #[async_trait]
    impl NewsSource for BrokenNews {
        async fn get_news_boost(&self, _fixture: &Fixture) -> Result<Option<f64>> {
            anyhow::bail!("news timeout")
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn alert_messages(&self) -> Vec<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| !m.starts_with("🔎"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<()> {
            self.messages.lock().unwrap().push(text.to_string());
            if self.fail {
                anyhow::bail!("chat unreachable");
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn fixture(id: &str, minute: u32, home: u32, away: u32) -> Fixture {
        Fixture {
            id: id.into(),
            league: "Bundesliga".into(),
            home_team: format!("Home {}", id),
            away_team: format!("Away {}", id),
            minute,
            home_goals: home,
            away_goals: away,
            home_form: TeamForm::AVERAGE,
            away_form: TeamForm::AVERAGE,
            refs: Default::default(),
        }
    }

    /// Pressure 6.0: shots 18, on target 7, dangerous attacks 75.
    fn busy_stats() -> StatisticsSnapshot {
        StatisticsSnapshot {
            home_shots: 10,
            away_shots: 8,
            home_shots_on_target: 4,
            away_shots_on_target: 3,
            home_dangerous_attacks: 40,
            away_dangerous_attacks: 35,
        }
    }

    fn config() -> Config {
        let mut cfg = test_config();
        cfg.football_api_key = Some("test-key".into());
        cfg.request_retries = 0;
        cfg
    }

    fn scanner_with(
        cfg: Config,
        feed: Arc<FakeFeed>,
        news: Arc<dyn NewsSource>,
        sink: Arc<RecordingSink>,
    ) -> Arc<Scanner> {
        scanner_with_forms(cfg, feed, news, Arc::new(NullSource), sink)
    }

    fn scanner_with_forms(
        cfg: Config,
        feed: Arc<FakeFeed>,
        news: Arc<dyn NewsSource>,
        team_forms: Arc<dyn TeamFormSource>,
        sink: Arc<RecordingSink>,
    ) -> Arc<Scanner> {
        let caches = EnrichmentCaches::from_config(&cfg);
        let sources = Sources {
            fixtures: feed,
            news,
            pregame: Arc::new(NullSource),
            players: Arc::new(NullSource),
            team_forms,
        };
        Arc::new(Scanner::new(cfg, sources, caches, sink, None))
    }

    fn feed(fixtures: Vec<Fixture>, odds: &[(&str, f64)]) -> FakeFeed {
        let stats = fixtures
            .iter()
            .map(|f| (f.id.clone(), busy_stats()))
            .collect();
        FakeFeed {
            fixtures: Mutex::new(fixtures),
            stats,
            odds: odds.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn qualified_fixture_alerts_once_per_goal_state() {
        let feed = Arc::new(feed(vec![fixture("7", 60, 1, 0)], &[("7", 2.10)]));
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(config(), feed.clone(), Arc::new(NullSource), sink.clone());

        let first = scanner.run_cycle().await;
        assert_eq!(first.alerts.len(), 1);
        assert_eq!(first.alerts[0].variant, AlertVariant::Full);
        // p = .35 + .15 pressure + .01 fresh + .04 momentum
        assert_relative_eq!(first.alerts[0].p_final, 0.55, epsilon = 1e-9);

        let second = scanner.run_cycle().await;
        assert!(second.alerts.is_empty());
        assert_eq!(second.block_summary, "cooldown=1");

        // Equaliser: differential changes, so the fixture may alert again.
        feed.fixtures.lock().unwrap()[0] = fixture("7", 62, 1, 1);
        let third = scanner.run_cycle().await;
        assert_eq!(third.alerts.len(), 1);
        assert_eq!(sink.alert_messages().len(), 2);
    }

    #[tokio::test]
    async fn low_odd_emits_watch_and_skips_cooldown() {
        let feed = Arc::new(feed(vec![fixture("8", 50, 2, 1)], &[("8", 1.30)]));
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(config(), feed, Arc::new(NullSource), sink);

        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].variant, AlertVariant::Watch);
        assert_eq!(scanner.cooldowns.len().await, 0);
        assert_eq!(scanner.status().await.alerts_watch, 1);
    }

    #[tokio::test]
    async fn missing_statistics_blocks_and_cycle_continues() {
        let mut f = feed(
            vec![fixture("1", 40, 1, 0), fixture("2", 40, 1, 0)],
            &[("1", 2.10), ("2", 2.10)],
        );
        f.stats.remove("1");
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(config(), Arc::new(f), Arc::new(NullSource), sink);

        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].fixture_id, "2");
        let status = scanner.status().await;
        assert_eq!(status.blocks.get("no_live_data"), Some(&1));
        assert_eq!(status.fixtures_in_window, 2);
    }

    #[tokio::test]
    async fn late_blowout_is_counted_as_goleada() {
        let feed = Arc::new(feed(vec![fixture("3", 70, 0, 5)], &[("3", 2.10)]));
        let scanner = scanner_with(
            config(),
            feed,
            Arc::new(NullSource),
            Arc::new(RecordingSink::default()),
        );
        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        assert_eq!(report.block_summary, "goleada=1");
    }

    #[tokio::test]
    async fn out_of_window_is_silent() {
        let feed = Arc::new(feed(vec![fixture("4", 10, 0, 0), fixture("5", 88, 1, 0)], &[]));
        let scanner = scanner_with(
            config(),
            feed,
            Arc::new(NullSource),
            Arc::new(RecordingSink::default()),
        );
        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        let status = scanner.status().await;
        assert_eq!(status.fixtures_seen, 2);
        assert_eq!(status.fixtures_in_window, 0);
        assert_eq!(status.block_summary, "none");
    }

    #[tokio::test]
    async fn no_odds_follows_policy() {
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(
            config(),
            Arc::new(feed(vec![fixture("6", 45, 1, 0)], &[])),
            Arc::new(NullSource),
            sink.clone(),
        );
        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        assert_eq!(report.block_summary, "none");
        assert_eq!(scanner.cooldowns.len().await, 0);

        let mut cfg = config();
        cfg.allow_no_odds_alerts = true;
        let scanner = scanner_with(
            cfg,
            Arc::new(feed(vec![fixture("6", 45, 1, 0)], &[])),
            Arc::new(NullSource),
            sink,
        );
        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].variant, AlertVariant::Manual);
        assert!(report.alerts[0].ev.is_none());
    }

    #[tokio::test]
    async fn failing_enrichment_and_sink_do_not_stop_alerts() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let scanner = scanner_with(
            config(),
            Arc::new(feed(vec![fixture("9", 60, 1, 0)], &[("9", 2.10)])),
            Arc::new(BrokenNews),
            sink.clone(),
        );
        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(sink.alert_messages().len(), 1);
        assert_eq!(scanner.status().await.errors, 0);
    }

    #[tokio::test]
    async fn stalled_team_forms_fall_back_to_average() {
        let mut cfg = config();
        cfg.request_timeout_secs = 1;
        let scanner = scanner_with_forms(
            cfg,
            Arc::new(feed(vec![fixture("12", 60, 1, 0)], &[("12", 2.10)])),
            Arc::new(NullSource),
            Arc::new(StalledForms),
            Arc::new(RecordingSink::default()),
        );

        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].fixture_id, "12");
        let status = scanner.status().await;
        assert_eq!(status.errors, 0);
        assert_eq!(status.fixtures_seen, 1);
        let cached = scanner.caches.team_forms.get("12", || async { Ok(None) }).await;
        assert!(matches!(cached, SourceOutcome::Degraded(_)));
    }

    #[tokio::test]
    async fn team_forms_feed_the_draw_gate() {
        // Level at 40': pressure 6.0 and p 0.57 qualify on nothing but form.
        let level = || Arc::new(feed(vec![fixture("13", 40, 0, 0)], &[("13", 2.10)]));

        let scanner = scanner_with(
            config(),
            level(),
            Arc::new(NullSource),
            Arc::new(RecordingSink::default()),
        );
        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        assert_eq!(report.block_summary, "draw_filter=1");

        let scanner = scanner_with_forms(
            config(),
            level(),
            Arc::new(NullSource),
            Arc::new(AttackingForms),
            Arc::new(RecordingSink::default()),
        );
        let report = scanner.run_cycle().await;
        assert_eq!(report.alerts.len(), 1);
        assert_relative_eq!(report.alerts[0].p_final, 0.57, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn fixture_list_failure_yields_status_only() {
        let feed = Arc::new(FakeFeed {
            fail_list: true,
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(config(), feed, Arc::new(NullSource), sink.clone());

        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        assert!(report.message.contains("fixture list unavailable"), "{}", report.message);
        assert!(sink.messages.lock().unwrap().is_empty());
        assert_eq!(scanner.status().await.phase, ScanPhase::Idle);
    }

    #[tokio::test]
    async fn missing_api_key_disables_scan() {
        let mut cfg = config();
        cfg.football_api_key = None;
        let feed = Arc::new(feed(vec![fixture("1", 60, 1, 0)], &[("1", 2.10)]));
        let scanner = scanner_with(cfg, feed.clone(), Arc::new(NullSource), Arc::new(RecordingSink::default()));

        assert!(!scanner.is_enabled());
        let report = scanner.run_cycle().await;
        assert!(report.alerts.is_empty());
        assert_eq!(report.message, "scan disabled: FOOTBALL_API_KEY not configured");
        assert_eq!(feed.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_cycles_alert_once() {
        let feed = Arc::new(feed(vec![fixture("11", 60, 1, 0)], &[("11", 2.10)]));
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner_with(config(), feed, Arc::new(NullSource), sink.clone());

        let (a, b) = tokio::join!(scanner.run_cycle(), scanner.run_cycle());
        assert_eq!(a.alerts.len() + b.alerts.len(), 1);
        assert_eq!(sink.alert_messages().len(), 1);
    }

    #[test]
    fn context_combines_pregame_and_player_impact() {
        let pregame = SourceOutcome::Available(PregameSignal {
            boost: 0.03,
            context_boost: 0.02,
            rating_home: 0.55,
            rating_away: 0.45,
        });
        let ctx = build_context(
            SourceOutcome::Degraded("timeout".into()),
            pregame,
            SourceOutcome::Available(0.02),
        );
        assert_eq!(ctx.news_boost, None);
        assert_eq!(ctx.pregame_boost, Some(0.03));
        assert_relative_eq!(ctx.context(), MAX_CONTEXT_BOOST);
        assert_eq!(ctx.best_rating(), Some(0.55));

        let ctx = build_context(
            SourceOutcome::Unavailable,
            SourceOutcome::Unavailable,
            SourceOutcome::Available(0.012),
        );
        assert_relative_eq!(ctx.context(), 0.012);
        assert!(ctx.best_rating().is_none());

        let empty = build_context(
            SourceOutcome::Unavailable,
            SourceOutcome::Unavailable,
            SourceOutcome::Unavailable,
        );
        assert_eq!(empty, EnrichmentContext::default());
    }
}
