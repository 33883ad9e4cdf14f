//! Telegram adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::domain::entities::{Content, IncomingMessage, Sender};
use crate::domain::traits::{Bot, BotInfo, KeyboardButton, Reply};
use crate::infrastructure::logging::mask_token;

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// Envelope every Bot API call answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

fn reply_markup(keyboard: &[Vec<KeyboardButton>]) -> Option<InlineKeyboardMarkup<'_>> {
    if keyboard.is_empty() {
        return None;
    }
    let inline_keyboard = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|btn| InlineKeyboardButton {
                    text: &btn.text,
                    callback_data: btn.callback_data.as_deref(),
                    url: btn.url.as_deref(),
                })
                .collect()
        })
        .collect();
    Some(InlineKeyboardMarkup { inline_keyboard })
}

/// Telegram bot adapter
pub struct TelegramAdapter {
    token: String,
    api_base: String,
    client: Client,
    info: BotInfo,
    parser: MessageParser,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, API_BASE)
    }

    /// Point the adapter at a different Bot API server
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            info: BotInfo {
                id: "unknown".to_string(),
                name: "vip-pay-bot".to_string(),
                username: "vip_pay_bot".to_string(),
            },
            parser: MessageParser,
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// POST a method call and unwrap the `{ok, result}` envelope
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, BotError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            // the request URL carries the token
            .map_err(|e| BotError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let data: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("{} ({}): {}", method, status, e.without_url())))?;

        if !data.ok {
            let description = data
                .description
                .unwrap_or_else(|| format!("{} failed with {}", method, status));
            if description.contains("message is not modified") {
                return Err(BotError::NotModified);
            }
            return Err(BotError::Telegram { description });
        }

        data.result
            .ok_or_else(|| BotError::Parse(format!("{}: missing result", method)))
    }

    /// Fetch bot info from Telegram API
    pub async fn fetch_bot_info(&mut self) -> Result<(), BotError> {
        #[derive(Deserialize)]
        struct BotInfoResponse {
            id: i64,
            first_name: String,
            username: Option<String>,
        }

        let me: BotInfoResponse = self.call("getMe", &serde_json::json!({})).await?;
        self.info = BotInfo {
            id: me.id.to_string(),
            name: me.first_name,
            username: me.username.unwrap_or_default(),
        };

        tracing::info!("Connected as @{} ({})", self.info.username, self.info.id);
        Ok(())
    }

    /// Drop the webhook, if any, together with updates queued while offline
    pub async fn drop_pending_updates(&self) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct DeleteWebhookRequest {
            drop_pending_updates: bool,
        }

        let _: bool = self
            .call(
                "deleteWebhook",
                &DeleteWebhookRequest {
                    drop_pending_updates: true,
                },
            )
            .await?;
        tracing::info!("Dropped pending updates");
        Ok(())
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64, timeout: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<&'static str>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout,
            allowed_updates: vec!["message", "callback_query"],
        };

        self.call("getUpdates", &request).await
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> Option<i64> {
        updates.iter().map(|u| u.update_id + 1).max()
    }

    /// Register bot commands with Telegram
    pub async fn register_commands(&self) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct Command {
            command: &'static str,
            description: &'static str,
        }

        #[derive(Serialize)]
        struct SetMyCommandsRequest {
            commands: Vec<Command>,
        }

        let request = SetMyCommandsRequest {
            commands: vec![
                Command { command: "start", description: "Show VIP plans" },
                Command { command: "admin", description: "Admin panel" },
            ],
        };

        let _: bool = self.call("setMyCommands", &request).await?;
        tracing::info!("Registered bot commands with Telegram");
        Ok(())
    }

    /// Turn a raw update into a platform-neutral message
    pub fn to_incoming(&self, update: &Update) -> Option<IncomingMessage> {
        if let Some(query) = &update.callback_query {
            let data = query.data.clone()?;
            let chat_id = query
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(query.from.id);
            let mut incoming = IncomingMessage::new(chat_id, sender(&query.from), Content::Callback(data))
                .with_callback_id(query.id.clone());
            if let Some(message) = &query.message {
                incoming = incoming.with_message_id(message.message_id);
            }
            return Some(incoming);
        }

        let message = update.message.as_ref()?;
        let from = message.from.as_ref()?;
        let text = message.text.as_deref()?;

        Some(
            IncomingMessage::new(message.chat.id, sender(from), self.parser.parse(text))
                .with_message_id(message.message_id),
        )
    }
}

fn sender(user: &User) -> Sender {
    let mut sender = Sender::new(user.id, user.first_name.clone().unwrap_or_default())
        .with_last_name(user.last_name.clone());
    if let Some(username) = &user.username {
        sender = sender.with_username(username.clone());
    }
    sender
}

#[async_trait]
impl Bot for TelegramAdapter {
    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<i64, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: i64,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_mode: Option<&'static str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<InlineKeyboardMarkup<'a>>,
        }

        #[derive(Deserialize)]
        struct MessageResult {
            message_id: i64,
        }

        tracing::debug!("Sending to {}: {}", chat_id, reply.text);
        let request = SendMessageRequest {
            chat_id,
            text: &reply.text,
            parse_mode: reply.parse_mode.map(|m| m.as_str()),
            reply_markup: reply_markup(&reply.keyboard),
        };

        let result: MessageResult = self.call("sendMessage", &request).await?;
        Ok(result.message_id)
    }

    async fn edit(&self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct EditMessageRequest<'a> {
            chat_id: i64,
            message_id: i64,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_mode: Option<&'static str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<InlineKeyboardMarkup<'a>>,
        }

        tracing::debug!("Editing {}/{}", chat_id, message_id);
        let request = EditMessageRequest {
            chat_id,
            message_id,
            text: &reply.text,
            parse_mode: reply.parse_mode.map(|m| m.as_str()),
            reply_markup: reply_markup(&reply.keyboard),
        };

        // Result is the edited Message (or `true` for inline messages)
        let _: serde_json::Value = self.call("editMessageText", &request).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct AnswerCallbackRequest<'a> {
            callback_query_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            text: Option<&'a str>,
            show_alert: bool,
        }

        let request = AnswerCallbackRequest {
            callback_query_id: callback_id,
            text,
            show_alert,
        };
        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}

impl std::fmt::Debug for TelegramAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAdapter")
            .field("token", &mask_token(&self.token))
            .field("api_base", &self.api_base)
            .finish()
    }
}
