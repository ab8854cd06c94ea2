//! End-to-end tests through the router, with a shell script standing in for
//! Vina and a stub ligand preparer.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use dockyard_common::Result;
use dockyard_config::Config;
use dockyard_molecules::ligand::LigandPreparer;
use dockyard_web::router::build_router;
use dockyard_web::state::AppState;

const BOUNDARY: &str = "dockyardtestboundary";

const FAKE_VINA: &str = r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
  esac
  shift
done
echo "mode |   affinity | dist from best mode"
echo "   1         -8.4      0.000      0.000"
echo "   2         -7.9      1.500      2.100"
printf 'MODEL 1\nHETATM    1  C   UNL     1       1.000   2.000   3.000  1.00  0.00     0.028 C\nENDMDL\n' > "$out"
"#;

struct StubPreparer;

#[async_trait]
impl LigandPreparer for StubPreparer {
    async fn prepare(&self, _smiles: &str, out: &Path) -> Result<()> {
        tokio::fs::write(out, "ATOM      1  C   UNL     1       0.000   0.000   0.000  0.00  0.00    +0.000 C\n").await?;
        Ok(())
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("vina");
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn app(dir: &Path) -> Router {
    let mut config = Config::default();
    config.tools.vina_path = write_script(dir, FAKE_VINA);
    config.workspace.root = dir.join("runs");
    build_router(AppState::with_preparer(config, Arc::new(StubPreparer)))
}

fn multipart(fields: &[(&str, &str)], receptor: Option<(&str, &str)>) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((file_name, content)) = receptor {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"receptor\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/dock")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn box_fields(size: &'static str) -> Vec<(&'static str, &'static str)> {
    vec![
        ("center_x", "1.5"),
        ("center_y", "-2"),
        ("center_z", "0"),
        ("size_x", size),
        ("size_y", size),
        ("size_z", size),
        ("exhaustiveness", "8"),
        ("smiles", "CCO"),
    ]
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn test_form_renders_with_session_cookie() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("dockyard_session="));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains(r#"accept=".pdbqt""#));
    assert!(html.contains(r#"name="exhaustiveness""#));
    assert!(html.contains("Start docking"));
}

#[tokio::test]
async fn test_incomplete_form_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app.clone().oneshot(multipart(&box_fields("20"), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("Upload a PDBQT receptor file"));
}

#[tokio::test]
async fn test_zero_box_is_rejected_and_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(multipart(&box_fields("0"), Some(("receptor.pdbqt", "ATOM\n"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains(r#"<div class="alert alert-warning">"#));
    // Submitted values stay in the form.
    assert!(html.contains(r#"name="center_x" value="1.500""#));
    assert!(!dir.path().join("runs").exists() || std::fs::read_dir(dir.path().join("runs")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_successful_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let receptor = "ATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00    -0.065 N\nCONECT    1    2\n";
    let response = app
        .clone()
        .oneshot(multipart(&box_fields("20"), Some(("receptor.pdbqt", receptor))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let run_id = location.trim_start_matches("/runs/").to_string();

    let mut status = String::new();
    for _ in 0..100 {
        let (code, json) = get(&app, &format!("/api/runs/{}", run_id)).await;
        assert_eq!(code, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        status = value["status"].as_str().unwrap().to_string();
        if status != "running" {
            assert_eq!(value["outcome"]["affinity"].as_f64(), Some(-8.4));
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, "succeeded");

    let (code, html) = get(&app, &location).await;
    assert_eq!(code, StatusCode::OK);
    assert!(html.contains("-8.4 kcal/mol"));

    let (code, ligand) = get(&app, &format!("/runs/{}/docked_ligand.pdbqt", run_id)).await;
    assert_eq!(code, StatusCode::OK);
    assert!(ligand.starts_with("HETATM"));
    assert!(!ligand.contains("MODEL"));

    let (code, complex) = get(&app, &format!("/runs/{}/complex.pdbqt", run_id)).await;
    assert_eq!(code, StatusCode::OK);
    assert!(complex.contains("ALA A"));
    assert!(!complex.contains("CONECT"));
    assert!(complex.contains("HETATM"));
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (code, _) = get(&app, "/runs/not-a-uuid").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    let (code, _) = get(&app, "/api/runs/6f1c1d4e-8b4a-4f3e-9d55-2a7c1e0b9f10").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    let (code, _) = get(&app, "/runs/6f1c1d4e-8b4a-4f3e-9d55-2a7c1e0b9f10/complex.pdbqt").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (code, json) = get(&app, "/health").await;
    assert_eq!(code, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["status"], "ok");
}
