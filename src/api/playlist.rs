//! Playlist API endpoints.

use axum::extract::State;

use super::{respond, ApiResult};
use crate::models::{Coin, RefreshOutcome, RefreshStatus, RevisionInfo};
use crate::AppState;

/// GET /api/playlist - The cached playlist.
pub async fn get_playlist(State(state): State<AppState>) -> ApiResult<Vec<Coin>> {
    let (coins, revision_id) = state.holder.playlist().current_at_revision();
    respond(Ok(coins), revision_id)
}

/// GET /api/playlist/revision - Revision and size of the cached playlist.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let info = state.holder.playlist().revision_info();
    let revision_id = info.revision_id;
    respond(Ok(info), revision_id)
}

/// GET /api/playlist/status - Outcome of the most recent refresh.
pub async fn get_refresh_status(State(state): State<AppState>) -> ApiResult<RefreshStatus> {
    respond(Ok(state.holder.status()), state.holder.playlist().revision_id())
}

/// POST /api/playlist/refresh - Fetch the remote playlist now.
///
/// Failures leave the cache as it was; the envelope reports the revision still served.
pub async fn refresh_playlist(State(state): State<AppState>) -> ApiResult<RefreshOutcome> {
    let result = state.holder.refresh_now().await;
    let revision_id = match &result {
        Ok(outcome) => outcome.revision_id,
        Err(_) => state.holder.playlist().revision_id(),
    };
    respond(result, revision_id)
}
