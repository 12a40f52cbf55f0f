//! Telegram transport: long-polls the Bot API over plain `reqwest` calls and
//! routes commands and callback tokens into the provisioning conversation
//! and the menu handlers. A catch-all around each update keeps a malformed
//! event from taking the process down.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::auth::AccessGate;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::keys::conversation::{
    ConversationEvent, Provisioner, CANCEL_TOKEN, CIPHER_TOKEN_PREFIX, DELETE_KEY_MSG_TOKEN,
    SHOW_KEY_TOKEN_PREFIX,
};
use crate::keys::store::CredentialStore;
use crate::menu::{self, token};
use crate::reply::Reply;
use crate::telemetry;

const POLL_TIMEOUT_SECS: u64 = 30;

pub struct Bot {
    client: reqwest::Client,
    token: String,
    config: Config,
    store: Arc<dyn CredentialStore>,
    gate: AccessGate,
    provisioner: Provisioner,
}

impl Bot {
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        gate: AccessGate,
        provisioner: Provisioner,
    ) -> AppResult<Self> {
        // Long polls hold the connection open for POLL_TIMEOUT_SECS, so the
        // client timeout must sit above it.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            token: config.bot_token.clone(),
            config,
            store,
            gate,
            provisioner,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token)
    }

    async fn call(&self, method: &str, payload: Value) -> AppResult<Value> {
        let body: Value = self
            .client
            .post(self.api_url(method))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        if body.get("ok") != Some(&Value::Bool(true)) {
            let description = body
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            return Err(AppError::Message(format!(
                "telegram {method} failed: {description}"
            )));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn keyboard(reply: &Reply) -> Value {
        // One button per row, matching the original layout.
        let rows: Vec<Value> = reply
            .choices
            .iter()
            .map(|choice| json!([{ "text": choice.label, "callback_data": choice.token }]))
            .collect();
        json!({ "inline_keyboard": rows })
    }

    async fn send_reply(&self, chat_id: i64, reply: &Reply) -> AppResult<()> {
        let mut payload = json!({ "chat_id": chat_id, "text": reply.text });
        if reply.html {
            payload["parse_mode"] = json!("HTML");
        }
        if !reply.choices.is_empty() {
            payload["reply_markup"] = Self::keyboard(reply);
        }
        self.call("sendMessage", payload).await?;
        Ok(())
    }

    async fn edit_to_reply(&self, chat_id: i64, message_id: i64, reply: &Reply) -> AppResult<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
        });
        if reply.html {
            payload["parse_mode"] = json!("HTML");
        }
        if !reply.choices.is_empty() {
            payload["reply_markup"] = Self::keyboard(reply);
        }
        // Edits fail when the content is unchanged; fall back to a fresh
        // message so the requester always sees a response.
        if self.call("editMessageText", payload).await.is_err() {
            self.send_reply(chat_id, reply).await?;
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        if let Err(err) = self.call("answerCallbackQuery", payload).await {
            debug!(?err, "answerCallbackQuery failed");
        }
    }

    pub async fn run(&self) -> AppResult<()> {
        info!("bot started, polling for updates");
        let mut offset: i64 = 0;
        loop {
            let updates = match self
                .call(
                    "getUpdates",
                    json!({ "offset": offset, "timeout": POLL_TIMEOUT_SECS }),
                )
                .await
            {
                Ok(Value::Array(updates)) => updates,
                Ok(_) => Vec::new(),
                Err(err) => {
                    warn!(?err, "getUpdates failed; backing off");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(update_id + 1);
                }
                // No single malformed update may terminate the service.
                if let Err(err) = self.dispatch(&update).await {
                    error!(?err, "update dispatch failed");
                }
            }
        }
    }

    async fn dispatch(&self, update: &Value) -> AppResult<()> {
        if let Some(message) = update.get("message") {
            let (Some(from), Some(chat_id), Some(text)) = (
                message.pointer("/from/id").and_then(Value::as_i64),
                message.pointer("/chat/id").and_then(Value::as_i64),
                message.pointer("/text").and_then(Value::as_str),
            ) else {
                return Ok(());
            };
            return self.handle_message(from, chat_id, text).await;
        }
        if let Some(callback) = update.get("callback_query") {
            return self.handle_callback(callback).await;
        }
        Ok(())
    }

    async fn handle_message(&self, requester: i64, chat_id: i64, text: &str) -> AppResult<()> {
        let reply = match text.trim() {
            "/start" => {
                if self.gate.is_privileged(requester) {
                    menu::admin_menu()
                } else {
                    menu::user_welcome()
                }
            }
            "/admin" => {
                if self.gate.is_privileged(requester) {
                    menu::admin_menu()
                } else {
                    Reply::text("⛔ Access denied")
                }
            }
            "/help" => menu::help_text(),
            "/about" => menu::about_text(),
            "/instruction" => menu::instruction_text(),
            "/cancel" => {
                self.provisioner
                    .handle(requester, ConversationEvent::Cancel)
                    .await
            }
            _ if self.provisioner.in_conversation(requester) => {
                self.provisioner
                    .handle(requester, ConversationEvent::Text(text.to_string()))
                    .await
            }
            _ => Reply::text("Use /start"),
        };
        self.send_reply(chat_id, &reply).await
    }

    async fn handle_callback(&self, callback: &Value) -> AppResult<()> {
        let (Some(callback_id), Some(requester), Some(data)) = (
            callback.pointer("/id").and_then(Value::as_str),
            callback.pointer("/from/id").and_then(Value::as_i64),
            callback.pointer("/data").and_then(Value::as_str),
        ) else {
            return Ok(());
        };
        let chat_id = callback
            .pointer("/message/chat/id")
            .and_then(Value::as_i64)
            .unwrap_or(requester);
        let message_id = callback.pointer("/message/message_id").and_then(Value::as_i64);
        let privileged = self.gate.is_privileged(requester);

        match data {
            token::INSTRUCTIONS => {
                self.send_reply(chat_id, &menu::instruction_text()).await?;
                self.answer_callback(callback_id, None).await;
            }
            token::HELP => {
                self.send_reply(chat_id, &menu::help_text()).await?;
                self.answer_callback(callback_id, None).await;
            }
            token::ABOUT => {
                self.send_reply(chat_id, &menu::about_text()).await?;
                self.answer_callback(callback_id, None).await;
            }
            token::CREATE_KEY => {
                let event = if privileged {
                    ConversationEvent::StartFor
                } else {
                    ConversationEvent::Start
                };
                let reply = self.provisioner.handle(requester, event).await;
                self.send_reply(chat_id, &reply).await?;
                self.answer_callback(callback_id, None).await;
            }
            CANCEL_TOKEN => {
                let reply = self
                    .provisioner
                    .handle(requester, ConversationEvent::Cancel)
                    .await;
                self.send_reply(chat_id, &reply).await?;
                self.answer_callback(callback_id, None).await;
            }
            _ if data.starts_with(CIPHER_TOKEN_PREFIX) => {
                let reply = self
                    .provisioner
                    .handle(requester, ConversationEvent::Choice(data.to_string()))
                    .await;
                self.send_reply(chat_id, &reply).await?;
                self.answer_callback(callback_id, None).await;
            }
            token::MAIN_MENU | token::BACK => {
                let reply = if privileged {
                    menu::admin_menu()
                } else {
                    menu::user_welcome()
                };
                self.send_reply(chat_id, &reply).await?;
                self.answer_callback(callback_id, None).await;
            }
            token::ADMIN_MENU => {
                if privileged {
                    self.send_reply(chat_id, &menu::admin_menu()).await?;
                    self.answer_callback(callback_id, None).await;
                } else {
                    self.answer_callback(callback_id, Some("⛔ Access denied")).await;
                }
            }
            token::ADMIN_SERVER_INFO => {
                if !privileged {
                    self.answer_callback(callback_id, Some("⛔ Access denied")).await;
                    return Ok(());
                }
                self.answer_callback(callback_id, Some("Loading server information..."))
                    .await;
                match telemetry::collect().await {
                    Ok(report) => {
                        let reply = menu::server_info(&report);
                        match message_id {
                            Some(id) => self.edit_to_reply(chat_id, id, &reply).await?,
                            None => self.send_reply(chat_id, &reply).await?,
                        }
                    }
                    Err(err) => {
                        error!(?err, "failed to collect host telemetry");
                        self.send_reply(chat_id, &Reply::text("❌ Error loading server information"))
                            .await?;
                    }
                }
            }
            token::ADMIN_API_INFO => {
                if privileged {
                    self.send_reply(chat_id, &menu::api_info(&self.config)).await?;
                }
                self.answer_callback(callback_id, None).await;
            }
            token::ADMIN_KEYS => {
                if privileged {
                    self.send_reply(chat_id, &menu::keys_menu()).await?;
                }
                self.answer_callback(callback_id, None).await;
            }
            token::LIST_KEYS => {
                if !privileged {
                    self.answer_callback(callback_id, Some("⛔ Access denied")).await;
                    return Ok(());
                }
                let records = self.store.list_all().await?;
                self.send_reply(chat_id, &menu::keys_list(&records)).await?;
                self.answer_callback(callback_id, None).await;
            }
            _ if data.starts_with(token::SELECT_USER_PREFIX) => {
                let id = data[token::SELECT_USER_PREFIX.len()..].parse::<u64>().ok();
                match self.lookup(id).await? {
                    Some(record) if privileged => {
                        self.send_reply(chat_id, &menu::user_detail(&record)).await?;
                        self.answer_callback(callback_id, None).await;
                    }
                    _ => self.answer_callback(callback_id, Some("❌ User not found")).await,
                }
            }
            _ if data.starts_with(SHOW_KEY_TOKEN_PREFIX) => {
                let id = data[SHOW_KEY_TOKEN_PREFIX.len()..].parse::<u64>().ok();
                match self.lookup(id).await? {
                    // A requester may reveal their own key; the operator any.
                    Some(record) if privileged || record.owner_identity == requester => {
                        self.send_reply(chat_id, &menu::revealed_key(&record)).await?;
                        self.answer_callback(callback_id, Some("Key revealed! Tap code to copy."))
                            .await;
                    }
                    _ => self.answer_callback(callback_id, Some("❌ Key not found")).await,
                }
            }
            _ if data.starts_with(token::SEND_KEY_PREFIX) => {
                if !privileged {
                    self.answer_callback(callback_id, Some("⛔ Access denied")).await;
                    return Ok(());
                }
                let owner = data[token::SEND_KEY_PREFIX.len()..].parse::<i64>().ok();
                let record = match owner {
                    Some(owner) => self.store.find_by_owner(owner).await?,
                    None => None,
                };
                match record {
                    Some(record) => {
                        let note = Reply::html(format!(
                            "🔐 <b>Here is your key:</b>\n\n<code>{}</code>",
                            record.credential_material
                        ));
                        match self.send_reply(record.owner_identity, &note).await {
                            Ok(()) => {
                                self.answer_callback(callback_id, Some("✅ Key sent to user")).await
                            }
                            Err(err) => {
                                error!(?err, owner = record.owner_identity, "failed to send key");
                                self.answer_callback(callback_id, Some("❌ Failed to send key")).await;
                            }
                        }
                    }
                    None => self.answer_callback(callback_id, Some("❌ User not found")).await,
                }
            }
            _ if data.starts_with(DELETE_KEY_MSG_TOKEN) => {
                let deleted = match message_id {
                    Some(id) => self
                        .call(
                            "deleteMessage",
                            json!({ "chat_id": chat_id, "message_id": id }),
                        )
                        .await
                        .is_ok(),
                    None => false,
                };
                let note = if deleted { "🧹 Message deleted" } else { "❌ Failed to delete" };
                self.answer_callback(callback_id, Some(note)).await;
            }
            _ => self.answer_callback(callback_id, Some("Unknown action")).await,
        }
        Ok(())
    }

    async fn lookup(&self, id: Option<u64>) -> AppResult<Option<crate::keys::models::CredentialRecord>> {
        match id {
            Some(id) => Ok(self.store.find_by_id(id).await?),
            None => Ok(None),
        }
    }
}
