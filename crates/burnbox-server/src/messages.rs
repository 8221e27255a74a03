//! Chat-platform payloads: what arrives from slash commands and button
//! clicks, and the attachment messages sent back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const READ_SECRET: &str = "read_secret";
pub const DELETE_SECRET: &str = "delete_secret";

const BRAND_COLOR: &str = "#6D5692";
const ERROR_COLOR: &str = "#FF0000";

// ── Incoming ─────────────────────────────────────────────────────────────────

/// Form body of a slash command invocation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub team_id: String,
}

/// Form body of `/interactive`: a single `payload` field holding JSON.
#[derive(Debug, Deserialize)]
pub struct InteractiveForm {
    pub payload: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub callback_id: String,
    pub user: User,
    pub view: Option<View>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct View {
    pub state: ViewState,
}

/// `values[block_id][action_id]`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputValue {
    pub value: Option<String>,
    pub selected_date: Option<String>,
}

impl View {
    /// Look up an input whose block and action share `id`.
    pub fn input(&self, id: &str) -> Option<&InputValue> {
        self.state.values.get(id).and_then(|block| block.get(id))
    }
}

/// A button callback token, carrying the secret identifier after the colon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback<'a> {
    ReadSecret(&'a str),
    DeleteSecret(&'a str),
}

impl<'a> Callback<'a> {
    pub fn parse(callback_id: &'a str) -> Option<Self> {
        let (kind, identifier) = callback_id.split_once(':')?;
        match kind {
            READ_SECRET => Some(Callback::ReadSecret(identifier)),
            DELETE_SECRET => Some(Callback::DeleteSecret(identifier)),
            _ => None,
        }
    }
}

// ── Outgoing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

#[derive(Debug, Default, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delete_original: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct Attachment {
    pub title: String,
    pub fallback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub callback_id: String,
    pub color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

#[derive(Debug, Serialize)]
pub struct Action {
    pub name: &'static str,
    pub text: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
    pub value: &'static str,
}

impl Message {
    /// In-channel envelope with a button that reveals the secret.
    pub fn envelope(sender: &str, identifier: &str) -> Self {
        let title = format!("{sender} sent a secret message");
        Self {
            response_type: Some(ResponseType::InChannel),
            delete_original: true,
            attachments: vec![Attachment {
                fallback: title.clone(),
                title,
                text: None,
                callback_id: format!("{READ_SECRET}:{identifier}"),
                color: BRAND_COLOR,
                footer: None,
                actions: vec![Action {
                    name: "readMessage",
                    text: ":envelope: Read message",
                    kind: "button",
                    style: None,
                    value: "readMessage",
                }],
            }],
        }
    }

    /// Ephemeral reveal of a retrieved secret, replacing the envelope.
    pub fn secret(plaintext: String, identifier: &str) -> Self {
        Self {
            response_type: Some(ResponseType::Ephemeral),
            delete_original: true,
            attachments: vec![Attachment {
                title: "Secret message".into(),
                fallback: "Secret message".into(),
                text: Some(plaintext),
                callback_id: format!("{DELETE_SECRET}:{identifier}"),
                color: BRAND_COLOR,
                footer: Some(
                    "The above message is only visible to you and will disappear when your \
                     client reloads. To remove it immediately, press the delete button",
                ),
                actions: vec![Action {
                    name: "removeMessage",
                    text: ":x: Delete message",
                    kind: "button",
                    style: Some("danger"),
                    value: "removeMessage",
                }],
            }],
        }
    }

    pub fn error(title: &str, text: &str, callback_id: &str, delete_original: bool) -> Self {
        Self {
            response_type: Some(ResponseType::Ephemeral),
            delete_original,
            attachments: vec![Attachment {
                title: title.into(),
                fallback: title.into(),
                text: Some(text.into()),
                callback_id: callback_id.into(),
                color: ERROR_COLOR,
                footer: None,
                actions: Vec::new(),
            }],
        }
    }

    pub fn delete_original() -> Self {
        Self {
            delete_original: true,
            ..Self::default()
        }
    }
}
