//! Landing page.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::state::AppState;

/// Serve `index.html` from the web directory.
///
/// The file is read on every request so it can be edited without a restart.
pub async fn index(State(state): State<AppState>) -> Response {
    let path = state.web_dir().join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Landing page unavailable");
            (StatusCode::INTERNAL_SERVER_ERROR, "index not found").into_response()
        }
    }
}
