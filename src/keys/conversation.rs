//! Per-requester provisioning conversation. All non-I/O transitions live in
//! the pure [`advance`] function; [`Provisioner`] owns the per-requester
//! state map and performs the single remote call plus persistence when a
//! flow commits.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, warn};

use crate::auth::AccessGate;
use crate::outline::OutlineClient;
use crate::reply::Reply;

use super::models::{CipherSuite, NewCredential};
use super::store::{CredentialStore, StoreError};

pub const CANCEL_TOKEN: &str = "cancel";
pub const CIPHER_TOKEN_PREFIX: &str = "select_cipher:";
pub const CIPHER_TOKEN_DEFAULT: &str = "select_cipher:default";
pub const SHOW_KEY_TOKEN_PREFIX: &str = "show_key:";
pub const DELETE_KEY_MSG_TOKEN: &str = "delete_key_msg";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    /// Operator is naming the identity the key is provisioned for.
    AwaitingTarget,
    AwaitingLabel {
        target: i64,
    },
    AwaitingCipher {
        target: i64,
        label: String,
    },
}

#[derive(Clone, Debug)]
pub enum ConversationEvent {
    /// Self-service entry: the requester provisions for themselves.
    Start,
    /// Operator entry: provision on behalf of another identity.
    StartFor,
    Text(String),
    Choice(String),
    Cancel,
}

/// Policy facts the service resolves before calling [`advance`], so the
/// transition function itself stays side-effect free.
#[derive(Clone, Copy, Debug)]
pub struct EventContext {
    pub requester: i64,
    pub is_privileged: bool,
    pub already_owns: bool,
}

/// Result of one transition: either a state change with a prompt, a
/// recoverable re-prompt, a terminal reset, or a commit to issuance.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Stay(Reply),
    Move(ConversationState, Reply),
    Reset(Reply),
    Issue {
        target: i64,
        label: String,
        cipher: CipherSuite,
    },
    Ignore,
}

pub fn advance(state: &ConversationState, event: &ConversationEvent, ctx: &EventContext) -> Step {
    match (state, event) {
        (_, ConversationEvent::Cancel) => Step::Reset(Reply::text("❌ Operation cancelled.")),

        (ConversationState::Idle, ConversationEvent::Start) => {
            if ctx.already_owns && !ctx.is_privileged {
                return Step::Reset(Reply::text("❌ You already have an Outline key."));
            }
            Step::Move(
                ConversationState::AwaitingLabel {
                    target: ctx.requester,
                },
                label_prompt(),
            )
        }

        (ConversationState::Idle, ConversationEvent::StartFor) => {
            if !ctx.is_privileged {
                return Step::Reset(Reply::text("⛔ Access denied"));
            }
            Step::Move(ConversationState::AwaitingTarget, target_prompt())
        }

        (ConversationState::AwaitingTarget, ConversationEvent::Text(text)) => {
            match text.trim().parse::<i64>() {
                Ok(target) => Step::Move(ConversationState::AwaitingLabel { target }, label_prompt()),
                Err(_) => Step::Stay(Reply::text("❌ Invalid user ID. Try again.")),
            }
        }

        (ConversationState::AwaitingLabel { target }, ConversationEvent::Text(text)) => {
            let label = text.trim();
            if label.is_empty() {
                return Step::Stay(label_prompt());
            }
            Step::Move(
                ConversationState::AwaitingCipher {
                    target: *target,
                    label: label.to_string(),
                },
                cipher_prompt(),
            )
        }

        (ConversationState::AwaitingCipher { target, label }, ConversationEvent::Choice(token)) => {
            match parse_cipher_token(token) {
                Some(cipher) => Step::Issue {
                    target: *target,
                    label: label.clone(),
                    cipher,
                },
                None => Step::Stay(cipher_prompt()),
            }
        }

        // Free text while a cipher choice is pending, or stray tokens mid
        // flow, re-prompt without a state change.
        (ConversationState::AwaitingCipher { .. }, ConversationEvent::Text(_)) => {
            Step::Stay(cipher_prompt())
        }
        (ConversationState::AwaitingTarget, ConversationEvent::Choice(_)) => {
            Step::Stay(target_prompt())
        }
        (ConversationState::AwaitingLabel { .. }, ConversationEvent::Choice(_)) => {
            Step::Stay(label_prompt())
        }

        _ => Step::Ignore,
    }
}

fn parse_cipher_token(token: &str) -> Option<CipherSuite> {
    if token == CIPHER_TOKEN_DEFAULT {
        return Some(CipherSuite::default());
    }
    CipherSuite::parse(token.strip_prefix(CIPHER_TOKEN_PREFIX)?)
}

fn target_prompt() -> Reply {
    Reply::text("✏️ Enter the Telegram ID of the user for whom you want to create a key:")
        .with_choice("❌ Cancel", CANCEL_TOKEN)
}

fn label_prompt() -> Reply {
    Reply::text("✏️ Enter a name/username for this Outline key:").with_choice("❌ Cancel", CANCEL_TOKEN)
}

fn cipher_prompt() -> Reply {
    let mut reply = Reply::text("🔐 Choose encryption for your key:");
    for cipher in CipherSuite::ALL {
        reply = reply.with_choice(
            cipher.as_str(),
            format!("{CIPHER_TOKEN_PREFIX}{}", cipher.as_str()),
        );
    }
    reply
        .with_choice("Skip (use chacha)", CIPHER_TOKEN_DEFAULT)
        .with_choice("❌ Cancel", CANCEL_TOKEN)
}

/// Drives the conversation map and runs the issuance side effects. Events
/// for one requester are handled to completion before the next, which is
/// the single-flight guarantee the store relies on.
pub struct Provisioner {
    store: Arc<dyn CredentialStore>,
    outline: OutlineClient,
    gate: AccessGate,
    sessions: DashMap<i64, ConversationState>,
}

impl Provisioner {
    pub fn new(store: Arc<dyn CredentialStore>, outline: OutlineClient, gate: AccessGate) -> Self {
        Self {
            store,
            outline,
            gate,
            sessions: DashMap::new(),
        }
    }

    /// True while the requester is mid-flow, i.e. free text should be routed
    /// into the conversation rather than treated as a stray message.
    pub fn in_conversation(&self, requester: i64) -> bool {
        self.sessions.contains_key(&requester)
    }

    pub async fn handle(&self, requester: i64, event: ConversationEvent) -> Reply {
        let state = self
            .sessions
            .get(&requester)
            .map(|entry| entry.clone())
            .unwrap_or(ConversationState::Idle);

        let is_privileged = self.gate.is_privileged(requester);
        // Resolved before the transition so the duplicate check happens
        // before any remote call, and only when it can matter.
        let already_owns = match (&state, &event) {
            (ConversationState::Idle, ConversationEvent::Start) if !is_privileged => {
                match self.store.find_by_owner(requester).await {
                    Ok(found) => found.is_some(),
                    Err(err) => {
                        error!(?err, requester, "credential store lookup failed");
                        return Reply::text("❌ Something went wrong. Try again later.");
                    }
                }
            }
            _ => false,
        };

        let ctx = EventContext {
            requester,
            is_privileged,
            already_owns,
        };

        match advance(&state, &event, &ctx) {
            Step::Stay(reply) => reply,
            Step::Move(next, reply) => {
                self.sessions.insert(requester, next);
                reply
            }
            Step::Reset(reply) => {
                self.sessions.remove(&requester);
                reply
            }
            Step::Ignore => Reply::text("Use /start"),
            Step::Issue {
                target,
                label,
                cipher,
            } => {
                // The flow is complete either way; clear it before the
                // blocking work so a later cancel has nothing to race with.
                self.sessions.remove(&requester);
                self.issue(requester, target, label, cipher, is_privileged)
                    .await
            }
        }
    }

    async fn issue(
        &self,
        requester: i64,
        target: i64,
        label: String,
        cipher: CipherSuite,
        is_privileged: bool,
    ) -> Reply {
        let material = match self.outline.create_access_key(&label, cipher).await {
            Ok(material) => material,
            Err(err) => {
                error!(?err, requester, target, "outline key issuance failed");
                return Reply::text("❌ Error creating key");
            }
        };

        let candidate = NewCredential {
            owner_identity: target,
            label,
            cipher_suite: cipher,
            credential_material: material.clone(),
        };
        match self.store.insert(candidate, !is_privileged).await {
            Ok(record) => Reply::html(format!(
                "✅ <b>Your Outline key has been created!</b>\n\n<tg-spoiler><code>{}</code></tg-spoiler>",
                record.credential_material
            ))
            .with_choice(
                "🔑 Show Key",
                format!("{SHOW_KEY_TOKEN_PREFIX}{}", record.internal_id),
            )
            .with_choice("🗑 Delete Message", DELETE_KEY_MSG_TOKEN),
            Err(StoreError::DuplicateOwner(owner)) => {
                warn!(owner, "issued key for an owner that already holds one");
                Reply::text("❌ You already have an Outline key.")
            }
            Err(err) => {
                // The remote side already handed out the key; keep the
                // material in the operator log so it can be recovered.
                error!(
                    ?err,
                    owner = target,
                    material = %material,
                    "failed to persist issued credential; material retained in log only"
                );
                Reply::text("❌ Error creating key")
            }
        }
    }
}
