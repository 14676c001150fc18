//! Alert and cycle-summary rendering (Telegram MarkdownV2).

use chrono::{DateTime, Utc};

use crate::bot::scanner::ScanStatus;
use crate::db::models::{Alert, AlertVariant, Fixture, MetricsBundle};

/// Render the message body for one alert variant.
pub fn render(variant: AlertVariant, fixture: &Fixture, m: &MetricsBundle, min_odd: f64) -> String {
    let header = match variant {
        AlertVariant::Full => "🔥 *Goal Signal*".to_string(),
        AlertVariant::Manual => format!("✍️ *Goal Signal* {}", escape_markdown("(no live odds)")),
        AlertVariant::Watch => format!("👀 *Watch* {}", escape_markdown("(odd below minimum)")),
    };

    let mut msg = format!(
        "{}\n\
        \n\
        🏟 {}\n\
        ⚽ {} `{}-{}` {}\n\
        ⏱ Minute: `{}'`\n\
        📊 Pressure: `{:.1}/10`\n\
        🎯 Probability: `{:.1}%`\n",
        header,
        escape_markdown(&fixture.league),
        escape_markdown(&fixture.home_team),
        fixture.home_goals,
        fixture.away_goals,
        escape_markdown(&fixture.away_team),
        fixture.minute,
        m.pressure,
        m.p_final * 100.0,
    );

    let line = escape_markdown(&format!("Over {:.1}", m.total_line));
    match (variant, m.market_odd) {
        (AlertVariant::Manual, _) | (_, None) => {
            msg.push_str(&format!(
                "💡 {}: check your book, fair odd `{:.2}`",
                line, m.fair_odd
            ));
        }
        (AlertVariant::Watch, Some(odd)) => {
            msg.push_str(&format!(
                "💰 {} @ `{:.2}` {}min `{:.2}`, fair `{:.2}`{}\n📉 EV: `{:+.1}%`",
                line,
                odd,
                escape_markdown("("),
                min_odd,
                m.fair_odd,
                escape_markdown(")"),
                m.ev * 100.0
            ));
        }
        (AlertVariant::Full, Some(odd)) => {
            msg.push_str(&format!(
                "💰 {} @ `{:.2}` {}fair `{:.2}`{}\n📈 EV: `{:+.1}%`",
                line,
                odd,
                escape_markdown("("),
                m.fair_odd,
                escape_markdown(")"),
                m.ev * 100.0
            ));
        }
    }
    msg
}

/// Build the alert record, rendering its text.
pub fn build_alert(
    variant: AlertVariant,
    fixture: &Fixture,
    m: &MetricsBundle,
    min_odd: f64,
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        id: None,
        fixture_id: fixture.id.clone(),
        fixture_name: fixture.name(),
        variant,
        minute: fixture.minute,
        home_goals: fixture.home_goals,
        away_goals: fixture.away_goals,
        pressure: m.pressure,
        p_final: m.p_final,
        odd: m.odd_current,
        ev: m.market_odd.map(|_| m.ev),
        text: render(variant, fixture, m, min_odd),
        created_at: now,
    }
}

/// One-message digest of a finished cycle.
pub fn render_summary(status: &ScanStatus) -> String {
    format!(
        "🔎 *Scan \\#{}*\n\
        \n\
        📋 Live: `{}` · in window: `{}`\n\
        🔔 Alerts: `{}` {}\n\
        🚫 Blocked: {}\n\
        ⚠️ Errors: `{}`",
        status.cycle,
        status.fixtures_seen,
        status.fixtures_in_window,
        status.alerts_total(),
        escape_markdown(&format!(
            "(full {}, manual {}, watch {})",
            status.alerts_full, status.alerts_manual, status.alerts_watch
        )),
        escape_markdown(&status.block_summary),
        status.errors,
    )
}

/// Escape MarkdownV2 special characters outside code spans.
pub fn escape_markdown(text: &str) -> String {
    let special_chars = [
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut result = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if special_chars.contains(&c) {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
