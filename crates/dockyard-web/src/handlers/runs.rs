//! Run status, results and downloads.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use tracing::info;

use dockyard_common::{DockyardError, RunId};
use dockyard_molecules::affinity::PoseScore;
use dockyard_molecules::pipeline::DockingOutcome;

use crate::handlers::{escape_html, not_found, page};
use crate::runs::{RunRecord, RunStatus};
use crate::state::SharedState;
use crate::viewer::render_scene;

pub const LIGAND_DOWNLOAD_NAME: &str = "docked_ligand.pdbqt";
pub const COMPLEX_DOWNLOAD_NAME: &str = "complex.pdbqt";

async fn lookup(state: &SharedState, id: &str) -> Option<RunRecord> {
    let id: RunId = id.parse().ok()?;
    state.runs.get(id).await
}

// ── Pages ─────────────────────────────────────────────────────────────────────

pub async fn run_page(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id).await {
        Some(record) => Html(render_run(&record)).into_response(),
        None => not_found("No docking run with this id."),
    }
}

pub async fn cancel_run(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let Ok(run_id) = id.parse::<RunId>() else {
        return not_found("No docking run with this id.");
    };
    match state.runs.cancel(run_id).await {
        Ok(true) => info!(run_id = %run_id, "Cancellation requested"),
        Ok(false) => {}
        Err(DockyardError::RunNotFound(_)) => return not_found("No docking run with this id."),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
    Redirect::to(&format!("/runs/{}", run_id)).into_response()
}

// ── Downloads ─────────────────────────────────────────────────────────────────

fn attachment(file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "chemical/x-pdbqt".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn finished_outcome(state: &SharedState, id: &str) -> Option<std::sync::Arc<DockingOutcome>> {
    lookup(state, id).await.and_then(|r| r.outcome)
}

pub async fn download_ligand(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match finished_outcome(&state, &id).await {
        Some(outcome) => attachment(LIGAND_DOWNLOAD_NAME, outcome.docked_pose.clone()),
        None => not_found("No docked pose for this run."),
    }
}

pub async fn download_complex(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match finished_outcome(&state, &id).await {
        Some(outcome) => attachment(COMPLEX_DOWNLOAD_NAME, outcome.complex()),
        None => not_found("No docked complex for this run."),
    }
}

/// JSON view of a run, used for polling.
pub async fn api_run(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "run not found" })),
        )
            .into_response(),
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn render_pose_table(poses: &[PoseScore]) -> String {
    if poses.is_empty() {
        return String::new();
    }
    let rows: String = poses
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
                p.mode, p.affinity, p.rmsd_lb, p.rmsd_ub
            )
        })
        .collect();
    format!(
        r#"<h2>All poses</h2>
<table class="table">
    <thead><tr><th>Mode</th><th>Affinity (kcal/mol)</th><th>RMSD l.b.</th><th>RMSD u.b.</th></tr></thead>
    <tbody>{}</tbody>
</table>"#,
        rows
    )
}

fn render_success(record: &RunRecord, outcome: &DockingOutcome) -> String {
    let note = if outcome.affinity.is_none() {
        r#"<div class="alert alert-info">Vina did not report a rank-1 affinity; see the raw output below.</div>"#
    } else {
        ""
    };
    format!(
        r#"<div class="alert alert-success">Docking completed in {secs:.1} s.</div>
<div class="metric">
    <div class="metric-label">Best binding affinity</div>
    <div class="metric-value">{label} kcal/mol</div>
</div>
{note}
<div class="results">
    <div>
        <h2>3D view of the complex</h2>
        {viewer}
    </div>
    <div class="downloads">
        <h2>Downloads</h2>
        <a class="btn btn-outline" href="/runs/{id}/docked_ligand.pdbqt" download>Docked ligand (.pdbqt)</a>
        <a class="btn btn-outline" href="/runs/{id}/complex.pdbqt" download>Complex (.pdbqt)</a>
    </div>
</div>
{table}
<h2>Raw Vina output</h2>
<pre class="raw">{stdout}</pre>"#,
        secs = outcome.duration_ms as f64 / 1000.0,
        label = escape_html(&outcome.affinity_label()),
        note = note,
        viewer = render_scene("complex-viewer", &outcome.receptor, &outcome.docked_pose),
        id = record.id,
        table = render_pose_table(&outcome.poses),
        stdout = escape_html(&outcome.stdout),
    )
}

fn render_running(record: &RunRecord) -> String {
    let stage = record.stage.map(|s| s.label()).unwrap_or("Starting");
    format!(
        r#"<p><span class="spinner"></span><span id="stage">{stage}</span>...</p>
<form method="POST" action="/runs/{id}/cancel">
    <button type="submit" class="btn btn-danger">Cancel</button>
</form>
<script>
(function() {{
    var runId = "{id}";
    var done = false;
    function finish() {{
        if (done) return;
        done = true;
        source.close();
        window.location.reload();
    }}
    // Events sent before the stream connected are not replayed, so the
    // status is checked on connect and then every few seconds.
    function check() {{
        fetch("/api/runs/" + runId)
            .then(function(r) {{ return r.json(); }})
            .then(function(run) {{ if (run.status !== "running") finish(); }})
            .catch(function() {{}});
    }}
    var source = new EventSource("/api/events");
    source.onopen = check;
    setInterval(check, 3000);
    source.onmessage = function(e) {{
        var event;
        try {{ event = JSON.parse(e.data); }} catch (_) {{ return; }}
        if (event.run_id !== runId) return;
        if (event.type === "run_stage") {{
            document.getElementById("stage").textContent = event.message;
        }} else if (event.type === "run_finished") {{
            finish();
        }}
    }};
}})();
</script>"#,
        stage = escape_html(stage),
        id = record.id,
    )
}

fn render_failure(record: &RunRecord, class: &str, fallback: &str) -> String {
    let message = record
        .failure
        .as_ref()
        .map(|f| f.message.as_str())
        .unwrap_or(fallback);
    let stdout = record
        .failure
        .as_ref()
        .and_then(|f| f.stdout.as_deref())
        .map(|out| format!(r#"<h2>Vina output</h2><pre class="raw">{}</pre>"#, escape_html(out)))
        .unwrap_or_default();
    format!(
        r#"<div class="alert {}">{}</div>{}"#,
        class,
        escape_html(message),
        stdout
    )
}

pub fn render_run(record: &RunRecord) -> String {
    let content = match (record.status, record.outcome.as_deref()) {
        (RunStatus::Running, _) => render_running(record),
        (RunStatus::Succeeded, Some(outcome)) => render_success(record, outcome),
        (RunStatus::Succeeded, None) | (RunStatus::Failed, _) => {
            render_failure(record, "alert-danger", "Docking failed.")
        }
        (RunStatus::Cancelled, _) => {
            render_failure(record, "alert-warning", "The run was cancelled.")
        }
        (RunStatus::TimedOut, _) => {
            render_failure(record, "alert-warning", "Docking took too long and was stopped.")
        }
    };

    let body = format!(
        r#"<main class="main-content">
    <h1 class="page-title">Docking run</h1>
    <p class="text-muted">Ligand <code>{smiles}</code>, exhaustiveness {exh}</p>
    {content}
    <p><a class="btn btn-outline" href="/">New docking</a></p>
</main>"#,
        smiles = escape_html(&record.smiles),
        exh = record.search_box.exhaustiveness,
        content = content,
    );
    page("Docking run", &body)
}
