//! HTTP handlers for the OAuth handshake.

use axum::{
    Router,
    extract::{Query, State},
    http::header::CACHE_CONTROL,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use futures::StreamExt;
use serde::Deserialize;
use snapshotter_slack::{SlackClient, is_eligible_member, paginate};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{OAuthError, Result};
use crate::state::AppState;

const ACKNOWLEDGEMENT: &str = "<h2>token acquired, thank you</h2>";

/// Build the collection router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/install", get(install_handler))
        .route("/", get(callback_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters of Slack's redirect back to the service.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /install
///
/// Starts a handshake: issues a state and redirects to Slack.
pub async fn install_handler(State(state): State<AppState>) -> Result<Response> {
    let redirect_uri = state.public_url().ok_or(OAuthError::TunnelUnavailable)?;
    let challenge = state.challenges.lock().issue();
    let url = state.config.authorization_url(&challenge, &redirect_uri)?;

    debug!("Issued handshake state");
    Ok(([(CACHE_CONTROL, "no-store")], Redirect::temporary(url.as_str())).into_response())
}

/// GET /?code=..&state=..
///
/// Finishes a handshake and records the member's token.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    if let Some(error) = params.error {
        return Err(OAuthError::Denied(error));
    }

    let challenge = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or(OAuthError::MissingState)?;
    state.challenges.lock().consume(&challenge)?;

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(OAuthError::MissingCode)?;
    let redirect_uri = state.public_url().ok_or(OAuthError::TunnelUnavailable)?;

    let access = state
        .slack
        .oauth_v2_access(
            &state.config.client_id,
            &state.config.client_secret,
            &code,
            &redirect_uri,
        )
        .await
        .map_err(OAuthError::Exchange)?;
    let token = access.authed_user.into_token();

    let needs_quota = state.ledger.lock().needs_quota();
    if needs_quota {
        let expected = count_eligible_members(&state.slack, &token.secret, state.config.page_delay)
            .await
            .map_err(OAuthError::Exchange)?;
        if state.ledger.lock().set_expected_total(expected) {
            info!(expected, "Member quota set");
        }
    }

    let owner_id = token.owner_id.clone();
    let (new_member, collected, expected) = {
        let mut ledger = state.ledger.lock();
        let new_member = ledger.record(token);
        (new_member, ledger.collected(), ledger.expected_total())
    };
    info!(member = %owner_id, new_member, collected, expected, "Token acquired");

    Ok(([(CACHE_CONTROL, "no-store")], Html(ACKNOWLEDGEMENT)).into_response())
}

/// Count members who can complete the handshake, across all `users.list` pages.
pub async fn count_eligible_members(
    slack: &SlackClient,
    token: &str,
    page_delay: Duration,
) -> snapshotter_slack::Result<usize> {
    let mut total = 0;
    let mut pages = paginate(slack.users_list(token), page_delay);
    while let Some(page) = pages.next().await {
        total += page?.items.iter().filter(|m| is_eligible_member(m)).count();
    }
    Ok(total)
}
