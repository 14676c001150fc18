use chrono::Duration;
use clap::Parser;

/// Live football signal scanner
#[derive(Parser, Debug, Clone)]
#[command(name = "livesignal-bot", version, about)]
pub struct Config {
    /// Dashboard / on-demand trigger listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// SQLite database path (warm cache + alert log)
    #[arg(long, env = "DATABASE_PATH", default_value = "livesignal.db")]
    pub database_path: String,

    /// Football data API base URL
    #[arg(
        long,
        env = "FOOTBALL_API_URL",
        default_value = "https://v3.football.api-sports.io"
    )]
    pub football_api_url: String,

    /// Football data API key (required for scanning)
    #[arg(long, env = "FOOTBALL_API_KEY")]
    pub football_api_key: Option<String>,

    /// Optional news-sentiment endpoint returning `{"boost": <float>}`
    #[arg(long, env = "NEWS_API_URL")]
    pub news_api_url: Option<String>,

    /// Telegram bot token for alert delivery
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat ID for alert delivery
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Seconds between periodic scan cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    pub poll_interval_secs: u64,

    /// Seconds between pregame warm-up refreshes
    #[arg(long, env = "WARMUP_INTERVAL_SECS", default_value = "1800")]
    pub warmup_interval_secs: u64,

    /// Send a summary message after every cycle
    #[arg(long, env = "NOTIFY_CYCLE_SUMMARY", default_value = "true", action = clap::ArgAction::Set)]
    pub notify_cycle_summary: bool,

    /// First minute (inclusive) of the alert window
    #[arg(long, env = "WINDOW_START", default_value = "20")]
    pub window_start: u32,

    /// Last minute (inclusive) of the alert window
    #[arg(long, env = "WINDOW_END", default_value = "80")]
    pub window_end: u32,

    /// Minimum pressure score required to keep evaluating
    #[arg(long, env = "MIN_PRESSURE", default_value = "4.0")]
    pub min_pressure: f64,

    /// Total-goals line above which the high-line malus applies
    #[arg(long, env = "HIGH_LINE_THRESHOLD", default_value = "3.5")]
    pub high_line_threshold: f64,

    /// Probability removed per whole goal of line above the threshold
    #[arg(long, env = "HIGH_LINE_MALUS", default_value = "0.03")]
    pub high_line_malus: f64,

    /// Upper bound of the combined momentum boost
    #[arg(long, env = "MOMENTUM_CAP", default_value = "0.08")]
    pub momentum_cap: f64,

    /// Minimum actionable market odd
    #[arg(long, env = "MIN_ODD", default_value = "1.47")]
    pub min_odd: f64,

    /// Maximum actionable market odd
    #[arg(long, env = "MAX_ODD", default_value = "3.50")]
    pub max_odd: f64,

    /// Minimum expected value when a market odd is available
    #[arg(long, env = "MIN_EV", default_value = "0.02")]
    pub min_ev: f64,

    /// Emit "manual" alerts for fixtures without a market odd
    #[arg(long, env = "ALLOW_NO_ODDS_ALERTS", default_value = "false", action = clap::ArgAction::Set)]
    pub allow_no_odds_alerts: bool,

    /// Emit "watch" alerts when the market odd undercuts MIN_ODD
    #[arg(long, env = "WATCH_ALERTS", default_value = "true", action = clap::ArgAction::Set)]
    pub watch_alerts: bool,

    /// Draw gate: pressure that qualifies a level scoreline on its own
    #[arg(long, env = "DRAW_HIGH_PRESSURE", default_value = "7.0")]
    pub draw_high_pressure: f64,

    /// Draw gate: contextual boost that qualifies a level scoreline
    #[arg(long, env = "DRAW_CONTEXT_MIN", default_value = "0.02")]
    pub draw_context_min: f64,

    /// Draw gate: minute after which moderate pressure is enough
    #[arg(long, env = "DRAW_LATE_MINUTE", default_value = "60")]
    pub draw_late_minute: u32,

    /// Draw gate: moderate pressure paired with DRAW_LATE_MINUTE
    #[arg(long, env = "DRAW_MODERATE_PRESSURE", default_value = "5.0")]
    pub draw_moderate_pressure: f64,

    /// Draw gate: pre-match rating (0-1) that qualifies either team
    #[arg(long, env = "DRAW_RATING_MIN", default_value = "0.60")]
    pub draw_rating_min: f64,

    /// Draw gate: final probability that qualifies a level scoreline
    #[arg(long, env = "DRAW_HIGH_PROBABILITY", default_value = "0.70")]
    pub draw_high_probability: f64,

    /// Goals-per-match rate that classifies a team as attacking or leaky
    #[arg(long, env = "ATTACKING_RATE", default_value = "1.5")]
    pub attacking_rate: f64,

    /// Blowout gate: absolute goal difference
    #[arg(long, env = "BLOWOUT_GOALS", default_value = "4")]
    pub blowout_goals: u32,

    /// Blowout gate: minute from which a blowout is suppressed
    #[arg(long, env = "BLOWOUT_MINUTE", default_value = "60")]
    pub blowout_minute: u32,

    /// Minutes during which an unchanged match state is not re-alerted
    #[arg(long, env = "COOLDOWN_MINUTES", default_value = "15")]
    pub cooldown_minutes: i64,

    /// Cache lifetime of a news boost
    #[arg(long, env = "NEWS_TTL_SECS", default_value = "1800")]
    pub news_ttl_secs: i64,

    /// Cache lifetime of a pregame signal
    #[arg(long, env = "PREGAME_TTL_SECS", default_value = "21600")]
    pub pregame_ttl_secs: i64,

    /// Cache lifetime of a player-impact delta
    #[arg(long, env = "PLAYER_TTL_SECS", default_value = "3600")]
    pub player_ttl_secs: i64,

    /// Cache lifetime of team attack/defense rates
    #[arg(long, env = "TEAM_FORM_TTL_SECS", default_value = "43200")]
    pub team_form_ttl_secs: i64,

    /// Cache lifetime of a failed or empty lookup, for every source
    #[arg(long, env = "NEGATIVE_TTL_SECS", default_value = "300")]
    pub negative_ttl_secs: i64,

    /// Timeout per external request attempt
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "8")]
    pub request_timeout_secs: u64,

    /// Retries after the first failed attempt of an external request
    #[arg(long, env = "REQUEST_RETRIES", default_value = "1")]
    pub request_retries: u32,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_start > self.window_end {
            anyhow::bail!(
                "window_start ({}) must not exceed window_end ({})",
                self.window_start,
                self.window_end
            );
        }
        if self.min_odd <= 1.0 || self.min_odd > self.max_odd {
            anyhow::bail!("min_odd must be > 1.0 and <= max_odd");
        }
        if self.poll_interval_secs == 0 || self.warmup_interval_secs == 0 {
            anyhow::bail!("poll and warm-up intervals must be positive");
        }
        let ttls = [
            self.news_ttl_secs,
            self.pregame_ttl_secs,
            self.player_ttl_secs,
            self.team_form_ttl_secs,
            self.negative_ttl_secs,
        ];
        if ttls.iter().any(|t| *t <= 0) {
            anyhow::bail!("cache TTLs must be positive");
        }
        if self.cooldown_minutes < 0 {
            anyhow::bail!("cooldown_minutes must not be negative");
        }
        if !(0.0..=0.2).contains(&self.momentum_cap) {
            anyhow::bail!("momentum_cap must be between 0.0 and 0.2");
        }
        Ok(())
    }

    /// Reason the scan cannot run, when the required secret is absent.
    pub fn scan_disabled_reason(&self) -> Option<String> {
        match self.football_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => None,
            _ => Some("FOOTBALL_API_KEY not configured".to_string()),
        }
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::seconds(self.negative_ttl_secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults plus `args`, ignoring every `env` binding so the host
/// environment cannot leak into tests.
#[cfg(test)]
pub(crate) fn config_from_args(args: &[&str]) -> Config {
    use clap::{CommandFactory, FromArgMatches};
    let cmd = Config::command().mut_args(|a| a.env(None::<&'static str>));
    let argv = std::iter::once("livesignal-bot").chain(args.iter().copied());
    let matches = cmd.try_get_matches_from(argv).unwrap();
    Config::from_arg_matches(&matches).unwrap()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    config_from_args(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_validate() {
        let cfg = test_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.window_start, 20);
        assert_eq!(cfg.window_end, 80);
        assert!(cfg.watch_alerts);
        assert!(!cfg.allow_no_odds_alerts);
    }

    #[test]
    fn missing_api_key_disables_scan_without_failing_validation() {
        let cfg = test_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.scan_disabled_reason().is_some());

        let cfg = config_from_args(&["--football-api-key", "k"]);
        assert!(cfg.scan_disabled_reason().is_none());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let cfg = config_from_args(&["--window-start", "85"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_odd_range_is_rejected() {
        let cfg = config_from_args(&["--min-odd", "4.0"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn boolean_knobs_accept_explicit_values() {
        let cfg = config_from_args(&["--watch-alerts", "false"]);
        assert!(!cfg.watch_alerts);
    }

    #[test]
    fn test_config_ignores_environment() {
        std::env::set_var("COOLDOWN_MINUTES", "99");
        let cfg = test_config();
        std::env::remove_var("COOLDOWN_MINUTES");
        assert_eq!(cfg.cooldown_minutes, 15);
    }
}
