use axum::{
    extract::State,
    response::{Html, Json},
};
use tracing::info;

use crate::error::AppResult;
use crate::models::{ApiVersion, StatusResponse, VersionEntry, VersionsResponse};
use crate::state::AppContext;

/// Liveness probe; does not touch any dependency.
pub async fn health_handler() -> Json<StatusResponse> {
    Json(StatusResponse::new("healthy"))
}

/// Readiness probe: both connectors must answer a ping.
pub async fn readiness_handler(State(ctx): State<AppContext>) -> AppResult<Json<StatusResponse>> {
    ctx.check_readiness().await?;
    info!("Readiness check passed");
    Ok(Json(StatusResponse::new("ready")))
}

pub async fn versions_handler() -> Json<VersionsResponse> {
    let versions = ApiVersion::ALL
        .iter()
        .map(|v| VersionEntry {
            version: v.major(),
            prefix: v.prefix(),
        })
        .collect();

    Json(VersionsResponse {
        versions,
        latest: ApiVersion::LATEST.major(),
    })
}

/// Minimal upload form for manual testing.
pub async fn index_handler(State(ctx): State<AppContext>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
  <head><title>Document classification</title></head>
  <body>
    <h1>Classify a document</h1>
    <form action="{host}/latest/predict" method="post" enctype="multipart/form-data">
      <input type="file" name="document" accept="application/pdf" required>
      <button type="submit">Predict</button>
    </form>
  </body>
</html>
"#,
        host = ctx.app_host.trim_end_matches('/')
    ))
}
