//! The docking form and its submission.

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::headers::Cookie;
use axum_extra::TypedHeader;
use tracing::{debug, info};

use dockyard_common::{DockyardError, Result};
use dockyard_molecules::pipeline::DockingRequest;
use dockyard_molecules::receptor::has_receptor_extension;
use dockyard_molecules::search_box::{
    BoxLimits, SearchBox, EXHAUSTIVENESS_MAX, EXHAUSTIVENESS_MIN,
};

use crate::handlers::{escape_html, page, session_id, with_session};
use crate::session::{set_cookie_value, SessionConfig};
use crate::state::SharedState;

const SMILES_PLACEHOLDER: &str = "e.g. COC1=C(C=C2C(=C1)CC(C2=O)CC3CCN(CC3)CC4=CC=CC=C4)OC";

// ── Form input ────────────────────────────────────────────────────────────────

/// An uploaded receptor file.
pub struct ReceptorUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything posted by the form, before validation.
#[derive(Default)]
pub struct DockForm {
    pub receptor: Option<ReceptorUpload>,
    pub smiles: String,
    pub search_box: SearchBox,
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        DockyardError::InvalidSearchBox(format!("{} must be a number, got {:?}", field, value))
    })
}

impl DockForm {
    /// Collect the multipart fields. Unknown fields are ignored; a file
    /// input left empty by the browser counts as no upload.
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = DockForm::default();
        let bad_body = |e: axum::extract::multipart::MultipartError| {
            DockyardError::IncompleteForm(format!("could not read the submitted form: {}", e))
        };

        while let Some(field) = multipart.next_field().await.map_err(bad_body)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "receptor" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_body)?;
                if !file_name.is_empty() {
                    form.receptor = Some(ReceptorUpload { file_name, bytes: bytes.to_vec() });
                }
                continue;
            }

            let value = field.text().await.map_err(bad_body)?;
            let b = &mut form.search_box;
            match name.as_str() {
                "smiles" => form.smiles = value.trim().to_string(),
                "center_x" => b.center[0] = parse_number(&name, &value)?,
                "center_y" => b.center[1] = parse_number(&name, &value)?,
                "center_z" => b.center[2] = parse_number(&name, &value)?,
                "size_x" => b.size[0] = parse_number(&name, &value)?,
                "size_y" => b.size[1] = parse_number(&name, &value)?,
                "size_z" => b.size[2] = parse_number(&name, &value)?,
                "exhaustiveness" => b.exhaustiveness = parse_number(&name, &value)?,
                other => debug!("Ignoring form field {:?}", other),
            }
        }
        Ok(form)
    }

    /// Check the form is complete and the box is usable, in that order.
    pub fn into_request(self, limits: BoxLimits) -> Result<DockingRequest> {
        let receptor = match self.receptor {
            Some(r) if !self.smiles.is_empty() => r,
            _ => {
                return Err(DockyardError::IncompleteForm(
                    "Upload a PDBQT receptor file and enter a SMILES string.".to_string(),
                ))
            }
        };
        if !has_receptor_extension(&receptor.file_name) {
            return Err(DockyardError::InvalidReceptor(format!(
                "{:?} is not a .pdbqt file",
                receptor.file_name
            )));
        }
        self.search_box.validate(limits)?;

        Ok(DockingRequest {
            receptor: receptor.bytes,
            smiles: self.smiles,
            search_box: self.search_box,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            search_box: self.search_box,
            smiles: self.smiles.clone(),
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

pub async fn dock_page(
    State(state): State<SharedState>,
    cookie: Option<TypedHeader<Cookie>>,
) -> Response {
    let (sid, session) = state.sessions.get_or_create(session_id(&cookie)).await;
    with_session(sid, StatusCode::OK, Html(render_form(&session, None)))
}

pub async fn dock_submit(
    State(state): State<SharedState>,
    cookie: Option<TypedHeader<Cookie>>,
    multipart: Multipart,
) -> Response {
    let (sid, session) = state.sessions.get_or_create(session_id(&cookie)).await;

    let form = match DockForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            return with_session(sid, StatusCode::UNPROCESSABLE_ENTITY, Html(render_form(&session, Some(&e))));
        }
    };

    let session = form.session_config();
    state.sessions.update(sid, session.clone()).await;

    match form.into_request(state.pipeline.limits()) {
        Ok(request) => {
            let run_id = state.spawn_run(sid, request).await;
            info!(run_id = %run_id, session = %sid, "Docking run submitted");
            (
                [(header::SET_COOKIE, set_cookie_value(sid))],
                Redirect::to(&format!("/runs/{}", run_id)),
            )
                .into_response()
        }
        Err(e) => {
            debug!("Form rejected: {}", e);
            with_session(sid, StatusCode::UNPROCESSABLE_ENTITY, Html(render_form(&session, Some(&e))))
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn number_input(name: &str, label: &str, value: f64) -> String {
    format!(
        r#"<div class="form-group">
            <label for="{name}">{label}</label>
            <input type="number" step="0.001" class="form-control" id="{name}" name="{name}" value="{value:.3}">
        </div>"#
    )
}

pub fn render_form(session: &SessionConfig, error: Option<&DockyardError>) -> String {
    let b = &session.search_box;
    let alert = match error {
        Some(e) if e.is_input_error() => format!(
            r#"<div class="alert alert-warning">{}</div>"#,
            escape_html(&e.to_string())
        ),
        Some(e) => format!(r#"<div class="alert alert-danger">{}</div>"#, escape_html(&e.to_string())),
        None => String::new(),
    };

    let body = format!(r#"<form class="app-container" method="POST" action="/dock" enctype="multipart/form-data">
<aside class="sidebar">
    <h2>1. Receptor</h2>
    <div class="form-group">
        <label for="receptor">Protein file (.pdbqt)</label>
        <input type="file" class="form-control" id="receptor" name="receptor" accept=".pdbqt">
    </div>

    <h2>2. Grid box</h2>
    <p class="text-muted small">Enter the box coordinates found in your visualization tool.</p>
    <h3>Center</h3>
    {cx}{cy}{cz}
    <h3>Size</h3>
    {sx}{sy}{sz}

    <h2>Vina parameters</h2>
    <div class="form-group">
        <label for="exhaustiveness">Exhaustiveness: <output id="exh-value">{exh}</output></label>
        <input type="range" class="form-control" id="exhaustiveness" name="exhaustiveness"
               min="{exh_min}" max="{exh_max}" value="{exh}"
               oninput="document.getElementById('exh-value').value = this.value">
        <p class="text-muted small">Higher values improve accuracy but take longer.</p>
    </div>
</aside>

<main class="main-content">
    <h1 class="page-title">Molecular Docking</h1>
    <p class="text-muted">Binding affinity estimation with AutoDock Vina.</p>
    {alert}
    <h2>3. Ligand</h2>
    <div class="form-group" style="max-width: 720px;">
        <label for="smiles">SMILES code</label>
        <input type="text" class="form-control" id="smiles" name="smiles"
               value="{smiles}" placeholder="{placeholder}">
        <p class="text-muted small">Enter the SMILES code of the molecule.</p>
    </div>
    <button type="submit" class="btn btn-primary">Start docking</button>
</main>
</form>"#,
        cx = number_input("center_x", "Center X", b.center[0]),
        cy = number_input("center_y", "Center Y", b.center[1]),
        cz = number_input("center_z", "Center Z", b.center[2]),
        sx = number_input("size_x", "Size X", b.size[0]),
        sy = number_input("size_y", "Size Y", b.size[1]),
        sz = number_input("size_z", "Size Z", b.size[2]),
        exh = b.exhaustiveness,
        exh_min = EXHAUSTIVENESS_MIN,
        exh_max = EXHAUSTIVENESS_MAX,
        alert = alert,
        smiles = escape_html(&session.smiles),
        placeholder = SMILES_PLACEHOLDER,
    );

    page("Docking", &body)
}
