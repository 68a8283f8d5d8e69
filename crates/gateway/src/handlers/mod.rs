//! API handlers module

pub mod chat;
pub mod contexts;
pub mod export;
pub mod health;
pub mod insights;
pub mod search;
pub mod tools;
pub mod upload;
pub mod visualize;

use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{errors::Result, models::Session};

/// Load (or create) the caller's session and resolve its active context id
pub(crate) async fn session_and_context(state: &AppState, session_id: &SessionId) -> Result<(Session, String)> {
    let mut session = state.store.get_or_create(session_id.as_str()).await?;
    let context_id = session.active_context_id(None)?;
    Ok((session, context_id))
}
