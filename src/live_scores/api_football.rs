use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::provider::{FixtureSource, PlayerImpactSource, PregameSource, TeamFormSource};
use crate::db::models::{
    Fixture, MatchForms, PregameSignal, ProviderRefs, StatisticsSnapshot, TeamForm,
};

/// Football data provider backed by the API-Football v3 REST API.
/// Docs: <https://www.api-football.com/documentation-v3>
#[derive(Clone)]
pub struct ApiFootball {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
}

impl ApiFootball {
    pub fn new(api_key: &str, base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiFootball {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("API-Football GET {} {:?}", url, query);

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("API-Football request to {} failed", path))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API-Football error {} on {}: {}", status, path, body);
        }

        let raw: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse API-Football {} response", path))?;
        if let Some(errors) = api_errors(&raw) {
            anyhow::bail!("API-Football rejected {}: {}", path, errors);
        }
        Ok(raw)
    }

    async fn team_form(&self, team_id: i64, refs: ProviderRefs) -> Result<Option<TeamForm>> {
        if team_id == 0 {
            return Ok(None);
        }
        let raw = self
            .get_json(
                "teams/statistics",
                &[
                    ("team", team_id.to_string()),
                    ("league", refs.league_id.to_string()),
                    ("season", refs.season.to_string()),
                ],
            )
            .await?;
        Ok(parse_team_form(&raw))
    }
}

#[async_trait]
impl FixtureSource for ApiFootball {
    fn name(&self) -> &str {
        "API-Football"
    }

    async fn list_live_fixtures(&self) -> Result<Vec<Fixture>> {
        let raw = self.get_json("fixtures", &[("live", "all".into())]).await?;
        Ok(parse_live_fixtures(&raw))
    }

    async fn get_statistics(&self, fixture_id: &str) -> Result<Option<StatisticsSnapshot>> {
        let raw = self
            .get_json("fixtures/statistics", &[("fixture", fixture_id.to_string())])
            .await?;
        Ok(parse_statistics(&raw))
    }

    async fn get_market_odd(
        &self,
        fixture_id: &str,
        total_goals_line: f64,
    ) -> Result<Option<f64>> {
        let raw = self
            .get_json("odds/live", &[("fixture", fixture_id.to_string())])
            .await?;
        Ok(parse_over_odd(&raw, total_goals_line))
    }
}

/// Forms come from the team-statistics endpoint, one request per side.
/// A side the provider does not know stays at league average.
#[async_trait]
impl TeamFormSource for ApiFootball {
    async fn get_team_forms(&self, fixture: &Fixture) -> Result<Option<MatchForms>> {
        let refs = fixture.refs;
        if refs.league_id == 0 {
            return Ok(None);
        }
        let (home, away) = futures_util::try_join!(
            self.team_form(refs.home_team_id, refs),
            self.team_form(refs.away_team_id, refs),
        )?;
        if home.is_none() && away.is_none() {
            return Ok(None);
        }
        Ok(Some(MatchForms {
            home: home.unwrap_or_default(),
            away: away.unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl PregameSource for ApiFootball {
    async fn get_pregame_signal(&self, fixture: &Fixture) -> Result<Option<PregameSignal>> {
        let raw = self
            .get_json("predictions", &[("fixture", fixture.id.clone())])
            .await?;
        Ok(parse_prediction(&raw))
    }
}

#[async_trait]
impl PlayerImpactSource for ApiFootball {
    async fn get_player_impact(&self, fixture: &Fixture) -> Result<Option<f64>> {
        let raw = self
            .get_json("injuries", &[("fixture", fixture.id.clone())])
            .await?;
        Ok(parse_player_impact(&raw))
    }
}

/// API-Football reports auth/quota problems as a non-empty `errors` field
/// on an HTTP 200.
fn api_errors(raw: &Value) -> Option<String> {
    match &raw["errors"] {
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map.clone()).to_string()),
        Value::Array(list) if !list.is_empty() => Some(Value::Array(list.clone()).to_string()),
        _ => None,
    }
}

/// Accepts numbers, numeric strings and percentages ("55%").
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn percent(v: &Value) -> Option<f64> {
    number(v).map(|p| p / 100.0)
}

/// Team forms start at league average; they are attached later per fixture.
fn parse_live_fixtures(raw: &Value) -> Vec<Fixture> {
    let Some(items) = raw["response"].as_array() else {
        return vec![];
    };

    items
        .iter()
        .filter_map(|it| {
            let id = it["fixture"]["id"].as_i64()?.to_string();
            let minute = u32::try_from(it["fixture"]["status"]["elapsed"].as_u64()?).ok()?;
            let home_goals = goals(&it["goals"]["home"])?;
            let away_goals = goals(&it["goals"]["away"])?;
            Some(Fixture {
                id,
                league: it["league"]["name"].as_str().unwrap_or("unknown").to_string(),
                home_team: it["teams"]["home"]["name"].as_str()?.to_string(),
                away_team: it["teams"]["away"]["name"].as_str()?.to_string(),
                minute,
                home_goals,
                away_goals,
                home_form: TeamForm::AVERAGE,
                away_form: TeamForm::AVERAGE,
                refs: ProviderRefs {
                    league_id: it["league"]["id"].as_i64().unwrap_or(0),
                    season: it["league"]["season"].as_i64().unwrap_or(0),
                    home_team_id: it["teams"]["home"]["id"].as_i64().unwrap_or(0),
                    away_team_id: it["teams"]["away"]["id"].as_i64().unwrap_or(0),
                },
            })
        })
        .collect()
}

/// Null means no goals yet; anything else must fit a `u32`.
fn goals(v: &Value) -> Option<u32> {
    match v {
        Value::Null => Some(0),
        other => u32::try_from(other.as_u64()?).ok(),
    }
}

fn stat_value(stats: &Value, names: &[&str]) -> u32 {
    stats
        .as_array()
        .into_iter()
        .flatten()
        .find(|s| {
            s["type"]
                .as_str()
                .is_some_and(|t| names.iter().any(|n| t.eq_ignore_ascii_case(n)))
        })
        .and_then(|s| number(&s["value"]))
        .map(|v| v.max(0.0) as u32)
        .unwrap_or(0)
}

/// Statistics come as one entry per team, home first.
fn parse_statistics(raw: &Value) -> Option<StatisticsSnapshot> {
    let teams = raw["response"].as_array()?;
    if teams.len() < 2 {
        return None;
    }
    let home = &teams[0]["statistics"];
    let away = &teams[1]["statistics"];
    if home.as_array().map_or(true, |a| a.is_empty()) && away.as_array().map_or(true, |a| a.is_empty()) {
        return None;
    }

    const SHOTS: &[&str] = &["Total Shots"];
    const ON_TARGET: &[&str] = &["Shots on Goal", "Shots on Target"];
    const DANGEROUS: &[&str] = &["Dangerous Attacks"];
    Some(StatisticsSnapshot {
        home_shots: stat_value(home, SHOTS),
        away_shots: stat_value(away, SHOTS),
        home_shots_on_target: stat_value(home, ON_TARGET),
        away_shots_on_target: stat_value(away, ON_TARGET),
        home_dangerous_attacks: stat_value(home, DANGEROUS),
        away_dangerous_attacks: stat_value(away, DANGEROUS),
    })
}

/// Best available decimal odd for "Over `line`" across the live goal-line markets.
fn parse_over_odd(raw: &Value, line: f64) -> Option<f64> {
    let entry = raw["response"].as_array()?.first()?;
    entry["odds"]
        .as_array()?
        .iter()
        .filter(|bet| {
            bet["name"].as_str().is_some_and(|n| {
                let n = n.to_lowercase();
                n.contains("over/under") || n.contains("match goals")
            })
        })
        .flat_map(|bet| bet["values"].as_array().into_iter().flatten())
        .filter(|v| v["value"].as_str().is_some_and(|s| s.eq_ignore_ascii_case("over")))
        .filter(|v| !v["suspended"].as_bool().unwrap_or(false))
        .filter(|v| number(&v["handicap"]).is_some_and(|h| (h - line).abs() < 1e-6))
        .filter_map(|v| number(&v["odd"]))
        .filter(|odd| *odd > 1.0)
        .fold(None, |best: Option<f64>, odd| Some(best.map_or(odd, |b| b.max(odd))))
}

fn parse_team_form(raw: &Value) -> Option<TeamForm> {
    let goals = &raw["response"]["goals"];
    let attack = number(&goals["for"]["average"]["total"])?;
    let defense = number(&goals["against"]["average"]["total"])?;
    Some(TeamForm {
        attack_rate: attack,
        defense_rate: defense,
    })
}

/// Predicted over/under swings the base boost; recent attacking form of both
/// sides feeds the contextual boost; the head-to-head comparison total gives
/// the strength ratings.
fn parse_prediction(raw: &Value) -> Option<PregameSignal> {
    let entry = raw["response"].as_array()?.first()?;

    let boost = match entry["predictions"]["under_over"].as_str() {
        Some(s) if s.starts_with('+') => 0.03,
        Some(s) if s.starts_with('-') => -0.02,
        _ => 0.0,
    };

    let att_home = percent(&entry["teams"]["home"]["last_5"]["att"]);
    let att_away = percent(&entry["teams"]["away"]["last_5"]["att"]);
    let context_boost = match (att_home, att_away) {
        (Some(h), Some(a)) => (((h + a) / 2.0 - 0.5) * 0.08).clamp(-0.03, 0.03),
        _ => 0.0,
    };

    let rating_home = percent(&entry["comparison"]["total"]["home"])?;
    let rating_away = percent(&entry["comparison"]["total"]["away"])?;

    Some(PregameSignal {
        boost,
        context_boost,
        rating_home: rating_home.clamp(0.0, 1.0),
        rating_away: rating_away.clamp(0.0, 1.0),
    })
}

/// Players ruled out of the fixture loosen both sides' structure; each adds a
/// small positive delta, capped.
fn parse_player_impact(raw: &Value) -> Option<f64> {
    let entries = raw["response"].as_array()?;
    if entries.is_empty() {
        return None;
    }
    let missing = entries
        .iter()
        .filter(|e| {
            e["player"]["type"]
                .as_str()
                .is_some_and(|t| t.eq_ignore_ascii_case("Missing Fixture"))
        })
        .count();
    Some((missing as f64 * 0.004).min(0.02))
}
