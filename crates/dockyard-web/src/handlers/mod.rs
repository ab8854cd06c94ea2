//! HTTP handlers for all web routes.

pub mod dock;
pub mod runs;
pub mod system;

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::headers::Cookie;
use axum_extra::TypedHeader;

use dockyard_common::SessionId;
use crate::session::{session_from_cookie, set_cookie_value, SESSION_COOKIE};

/// Stylesheet shared across all pages
pub const STYLE_CSS: &str = include_str!("../../templates/style.css");

pub const APP_TITLE: &str = "Molecular Docking Tool";

/// Wrap page `body` in the common document shell.
pub fn page(title: &str, body: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{} — {}</title>
    <style>{}</style>
</head>
<body>
{}
</body>
</html>"#, escape_html(title), APP_TITLE, STYLE_CSS, body)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The session id carried by the request's cookie, if any.
pub fn session_id(cookie: &Option<TypedHeader<Cookie>>) -> Option<SessionId> {
    session_from_cookie(cookie.as_ref().and_then(|TypedHeader(c)| c.get(SESSION_COOKIE)))
}

/// Attach the session cookie to any response.
pub fn with_session(id: SessionId, status: StatusCode, response: impl IntoResponse) -> Response {
    (status, [(header::SET_COOKIE, set_cookie_value(id))], response).into_response()
}

pub fn not_found(what: &str) -> Response {
    let body = format!(
        r#"<main class="main-content">
    <h1 class="page-title">Not found</h1>
    <p class="text-muted">{}</p>
    <a class="btn btn-outline" href="/">Back to the form</a>
</main>"#,
        escape_html(what)
    );
    (StatusCode::NOT_FOUND, Html(page("Not found", &body))).into_response()
}
