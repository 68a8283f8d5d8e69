//! Chart data for the current context

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::Result,
    tools::{visualizer, ChartKind, ChartPoint},
};

#[derive(Debug, Default, Deserialize)]
pub struct VisualizeParams {
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Serialize)]
pub struct VisualizeResponse {
    pub chart: ChartKind,
    pub context_id: String,
    pub data: Vec<ChartPoint>,
    pub description: String,
}

pub async fn visualize(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<VisualizeParams>,
) -> Result<Json<VisualizeResponse>> {
    let kind: ChartKind = match params.kind.as_deref() {
        Some(kind) => kind.parse()?,
        None => ChartKind::default(),
    };

    let (session, context_id) = session_and_context(&state, &session_id).await?;
    let chunks = &session.context(&context_id)?.chunks;
    let data = visualizer::chart(kind, chunks, state.config.tools.visualizer_top_n);

    Ok(Json(VisualizeResponse {
        chart: kind,
        description: visualizer::describe(&data),
        context_id,
        data,
    }))
}
