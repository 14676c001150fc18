use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::bot::Scanner;

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
}

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/scan", post(scan_handler))
            .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Serve the status page, marking whether scanning is enabled.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let html = DASHBOARD_HTML.replace(
        r#"<body>"#,
        &format!(r#"<body data-enabled="{}">"#, state.scanner.is_enabled()),
    );
    Html(html)
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scanner.status().await)
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<i64>,
}

/// GET /api/alerts?limit=50
async fn alerts_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AlertsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    match state.scanner.db() {
        Some(db) => db
            .list_recent_alerts(limit)
            .map(Json)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        None => Ok(Json(Vec::new())),
    }
}

/// POST /api/scan: run one cycle now and return what it produced.
async fn scan_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("On-demand scan requested");
    Json(state.scanner.run_cycle().await)
}

/// Embedded single-file status page (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>LiveSignal Scanner</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; text-transform: uppercase; }
  .badge.off { background: #ff9800; color: #000; }
  .badge.on { background: var(--green); color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .stats-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 1rem; }
  .stat-card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .stat-card .label { color: var(--muted); font-size: .8rem; text-transform: uppercase; letter-spacing: .06em; margin-bottom: .4rem; }
  .stat-card .value { font-size: 1.7rem; font-weight: 700; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  .panel-body { padding: .9rem 1.2rem; color: var(--muted); font-size: .9rem; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  tr:last-child td { border-bottom: none; }
  .pill { display: inline-block; padding: .15rem .55rem; border-radius: 20px; font-size: .75rem; font-weight: 600; }
  .pill.full { background: rgba(0,200,150,.15); color: var(--green); }
  .pill.manual { background: rgba(108,99,255,.2); color: var(--accent); }
  .pill.watch { background: rgba(255,152,0,.15); color: #ff9800; }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
  .btn { background: none; border: 1px solid var(--border); color: var(--muted); padding: .3rem .8rem; border-radius: 6px; cursor: pointer; font-size: .8rem; }
  .btn:hover { border-color: var(--accent); color: var(--accent); }
</style>
</head>
<body>
<header>
  <h1>⚽ LiveSignal Scanner</h1>
  <span class="badge" id="mode-badge">…</span>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="last-updated"></span>
</header>

<main>
  <div class="stats-grid">
    <div class="stat-card"><div class="label">Cycle</div><div class="value" id="s-cycle">–</div></div>
    <div class="stat-card"><div class="label">Phase</div><div class="value" id="s-phase">–</div></div>
    <div class="stat-card"><div class="label">Live Fixtures</div><div class="value" id="s-seen">–</div></div>
    <div class="stat-card"><div class="label">In Window</div><div class="value" id="s-window">–</div></div>
    <div class="stat-card"><div class="label">Alerts</div><div class="value" id="s-alerts">–</div></div>
    <div class="stat-card"><div class="label">Errors</div><div class="value" id="s-errors">–</div></div>
    <div class="stat-card"><div class="label">Duration</div><div class="value" id="s-duration">–</div></div>
  </div>

  <div class="panel">
    <div class="panel-header">Last Cycle <button class="btn" onclick="scanNow()">▶ Scan now</button></div>
    <div class="panel-body"><div id="s-message">–</div><div>Blocked: <span id="s-blocks">–</span></div></div>
  </div>

  <div class="panel">
    <div class="panel-header">Recent Alerts <button class="btn" onclick="loadAll()">↻ Refresh</button></div>
    <table>
      <thead><tr><th>Time</th><th>Fixture</th><th>Type</th><th>Min</th><th>Score</th><th>Pressure</th><th>Prob</th><th>Odd</th><th>EV</th></tr></thead>
      <tbody id="alerts-tbody"><tr><td colspan="9" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>
</main>

<script>
const enabled = document.body.dataset.enabled === 'true';
const badge = document.getElementById('mode-badge');
badge.textContent = enabled ? 'scanning' : 'disabled';
badge.className = 'badge ' + (enabled ? 'on' : 'off');

const pct = v => (v * 100).toFixed(1) + '%';
const set = (id, v) => { document.getElementById(id).textContent = v; };
const esc = v => String(v).replace(/[&<>"']/g, c =>
  ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;' }[c]));

async function loadStatus() {
  const s = await (await fetch('/api/status')).json();
  set('s-cycle', s.cycle);
  set('s-phase', s.phase);
  set('s-seen', s.fixtures_seen);
  set('s-window', s.fixtures_in_window);
  set('s-alerts', s.alerts_full + s.alerts_manual + s.alerts_watch);
  set('s-errors', s.errors);
  set('s-duration', s.duration_ms + ' ms');
  set('s-message', s.message);
  set('s-blocks', s.block_summary);
}

async function loadAlerts() {
  const alerts = await (await fetch('/api/alerts?limit=50')).json();
  const tbody = document.getElementById('alerts-tbody');
  if (!alerts.length) {
    tbody.innerHTML = '<tr><td colspan="9" class="empty">No alerts yet</td></tr>';
    return;
  }
  tbody.innerHTML = alerts.map(a => `<tr>
    <td>${new Date(a.created_at).toLocaleTimeString()}</td>
    <td>${esc(a.fixture_name)}</td>
    <td><span class="pill ${esc(a.variant)}">${esc(a.variant)}</span></td>
    <td>${a.minute}'</td>
    <td>${a.home_goals}-${a.away_goals}</td>
    <td>${a.pressure.toFixed(1)}</td>
    <td>${pct(a.p_final)}</td>
    <td>${a.odd.toFixed(2)}</td>
    <td>${a.ev === null ? '–' : pct(a.ev)}</td>
  </tr>`).join('');
}

async function scanNow() {
  await fetch('/api/scan', { method: 'POST' });
  loadAll();
}

function loadAll() {
  loadStatus();
  loadAlerts();
  set('last-updated', 'Updated ' + new Date().toLocaleTimeString());
}

loadAll();
setInterval(loadAll, 15000);
</script>
</body>
</html>
"#;
