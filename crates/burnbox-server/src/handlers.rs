use anyhow::Context;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde_json::json;
use tracing::{error, warn};

use crate::{
    messages::{Callback, Interaction, InteractiveForm, Message, SlashCommand},
    store::{RedbStore, SecretStore},
    vault::{Created, Retrieval, Vault},
    AppState,
};

pub const SECRET_COMMAND: &str = "/secret";
pub const SECRET_TEXT_INPUT: &str = "secret_text_input";
pub const EXPIRY_DATE_INPUT: &str = "expiry_date_input";
const VIEW_SUBMISSION: &str = "view_submission";

const HEALTH_PROBE_KEY: &str = "health-probe";
const GENERIC_ERROR: &str = ":x: Sorry, an error occurred";

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.vault.store().clone();
    match tokio::task::spawn_blocking(move || store.exists(HEALTH_PROBE_KEY)).await {
        Ok(Ok(_)) => Json(json!({"status": "UP"})).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "health probe failed");
            down()
        }
        Err(e) => {
            error!(error = %e, "health probe task failed");
            down()
        }
    }
}

fn down() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"status": "DOWN"})),
    )
        .into_response()
}

// ── Slash command ─────────────────────────────────────────────────────────────

pub async fn slash(State(state): State<AppState>, Form(cmd): Form<SlashCommand>) -> Response {
    if cmd.command != SECRET_COMMAND {
        return StatusCode::OK.into_response();
    }

    if cmd.text.trim().is_empty() {
        return Json(Message::error(
            "Error: secret text is empty",
            "It looks like you tried to send a secret but forgot to provide the secret's text. \
             You can send a secret like this: `/secret I am scared of heights`",
            "secret_text_empty",
            false,
        ))
        .into_response();
    }

    match create_secret(&state, cmd.text, None).await {
        Ok(created) => Json(Message::envelope(&cmd.user_name, &created.identifier)).into_response(),
        Err(resp) => resp,
    }
}

// ── Interactive callbacks ─────────────────────────────────────────────────────

pub async fn interactive(
    State(state): State<AppState>,
    Form(form): Form<InteractiveForm>,
) -> Response {
    let interaction: Interaction = match serde_json::from_str(&form.payload) {
        Ok(i) => i,
        Err(e) => {
            warn!(error = %e, "malformed interaction payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "Bad Request"})),
            )
                .into_response();
        }
    };

    if interaction.kind == VIEW_SUBMISSION {
        return view_submission(&state, interaction).await;
    }

    // The callback id carries the identifier; only its kind may be logged.
    match Callback::parse(&interaction.callback_id) {
        Some(Callback::ReadSecret(identifier)) => read_secret(&state, identifier).await,
        Some(Callback::DeleteSecret(_)) => Json(Message::delete_original()).into_response(),
        None => {
            warn!(kind = %interaction.kind, "unknown interaction");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn read_secret(state: &AppState, identifier: &str) -> Response {
    let id = identifier.to_owned();
    let outcome = match blocking(state, move |vault| vault.retrieve(&id)).await {
        Ok(outcome) => outcome,
        Err(e) => return internal_error(e),
    };

    let message = match outcome {
        Retrieval::Delivered { plaintext, .. } => Message::secret(plaintext, identifier),
        Retrieval::Expired { .. } => Message::error(
            ":hourglass: Secret expired",
            "This Secret has expired",
            "secret_expired",
            true,
        ),
        Retrieval::NotFound => Message::error(
            ":question: Secret not found",
            "This Secret has already been retrieved or has expired",
            "secret_not_found",
            true,
        ),
        Retrieval::DecryptFailed(_) => Message::error(
            GENERIC_ERROR,
            "An error occurred attempting to retrieve secret",
            "decrypt_error",
            false,
        ),
        Retrieval::StoreError(_) => Message::error(
            GENERIC_ERROR,
            "An error occurred attempting to retrieve secret",
            "secret_get_error",
            false,
        ),
    };
    Json(message).into_response()
}

async fn view_submission(state: &AppState, interaction: Interaction) -> Response {
    let view = interaction.view.unwrap_or_default();

    let text = view
        .input(SECRET_TEXT_INPUT)
        .and_then(|input| input.value.clone())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Json(json!({
            "response_action": "errors",
            "errors": { SECRET_TEXT_INPUT: "Enter the secret you want to send" }
        }))
        .into_response();
    }

    let expires_at = view
        .input(EXPIRY_DATE_INPUT)
        .and_then(|input| input.selected_date.as_deref())
        .and_then(parse_expiry_date);

    match create_secret(state, text, expires_at).await {
        Ok(created) => {
            Json(Message::envelope(&interaction.user.name, &created.identifier)).into_response()
        }
        Err(resp) => resp,
    }
}

/// Midnight UTC of a `YYYY-MM-DD` date picker value.
pub fn parse_expiry_date(date: &str) -> Option<i64> {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()),
        Err(e) => {
            warn!(date, error = %e, "ignoring unparseable expiry date");
            None
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn create_secret(
    state: &AppState,
    plaintext: String,
    expires_at: Option<i64>,
) -> Result<Created, Response> {
    match blocking(state, move |vault| vault.create(&plaintext, expires_at)).await {
        Ok(Ok(created)) => Ok(created),
        Ok(Err(e)) => {
            error!(error = %e, "failed to create secret");
            Err(Json(Message::error(
                GENERIC_ERROR,
                "An error occurred attempting to create secret",
                "store_error",
                false,
            ))
            .into_response())
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// Run a vault call on the blocking pool, holding a key-derivation permit.
async fn blocking<T, F>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Vault<RedbStore>) -> T + Send + 'static,
    T: Send + 'static,
{
    let _permit = state
        .kdf_permits
        .acquire()
        .await
        .context("key derivation semaphore closed")?;
    let vault = state.vault.clone();
    tokio::task::spawn_blocking(move || f(vault))
        .await
        .context("vault task failed")
}

fn internal_error(e: anyhow::Error) -> Response {
    error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
