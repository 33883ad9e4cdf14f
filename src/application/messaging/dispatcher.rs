//! Message dispatcher - Routes incoming updates to handlers and delivers the result

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::parser::{Action, MessageParser};
use crate::application::errors::BotError;
use crate::application::services::PaymentService;
use crate::application::views::{self, ERROR_TEXT};
use crate::domain::entities::{Content, IncomingMessage};
use crate::domain::traits::{Bot, Reply};
use crate::infrastructure::config::Config;

/// Callback query answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Popup instead of a toast
    pub alert: bool,
}

impl Answer {
    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: true,
        }
    }
}

/// What a handler wants shown to the user it is serving
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Replaces the pressed message for callbacks, sent fresh otherwise
    pub screen: Option<Reply>,
    /// Always sent as a new message after the screen
    pub follow_up: Option<Reply>,
    pub answer: Option<Answer>,
}

impl Outcome {
    pub fn screen(reply: Reply) -> Self {
        Self {
            screen: Some(reply),
            ..Self::default()
        }
    }

    pub fn follow_up(reply: Reply) -> Self {
        Self {
            follow_up: Some(reply),
            ..Self::default()
        }
    }

    pub fn answer(answer: Answer) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn with_answer(mut self, answer: Answer) -> Self {
        self.answer = Some(answer);
        self
    }

    pub fn nothing() -> Self {
        Self::default()
    }
}

/// Routes commands and button presses for one bot
pub struct MessageDispatcher {
    pub(super) bot: Arc<dyn Bot>,
    pub(super) payments: Arc<PaymentService>,
    pub(super) config: Arc<Config>,
    parser: MessageParser,
}

impl MessageDispatcher {
    pub fn new(bot: Arc<dyn Bot>, payments: Arc<PaymentService>, config: Arc<Config>) -> Self {
        Self {
            bot,
            payments,
            config,
            parser: MessageParser,
        }
    }

    /// Handle one update end to end. Never fails: errors are logged and the
    /// user sees a generic error screen. Callbacks are answered exactly once.
    pub async fn dispatch(&self, msg: IncomingMessage) {
        self.dispatch_at(msg, Utc::now()).await
    }

    pub async fn dispatch_at(&self, msg: IncomingMessage, now: DateTime<Utc>) {
        let answer = match self.process(&msg, now).await {
            Ok(answer) => answer,
            Err(e) if e.is_not_modified() => Some(Answer::toast("Already up to date")),
            Err(e) => {
                tracing::error!("Error handling update from {}: {}", msg.sender.id, e);
                if let Err(e) = self.show(&msg, &Reply::text(ERROR_TEXT)).await {
                    tracing::warn!("Could not show error to {}: {}", msg.chat_id, e);
                }
                None
            }
        };

        if let Some(callback_id) = &msg.callback_id {
            let (text, alert) = match &answer {
                Some(a) => (Some(a.text.as_str()), a.alert),
                None => (None, false),
            };
            if let Err(e) = self.bot.answer_callback(callback_id, text, alert).await {
                tracing::warn!("Failed to answer callback {}: {}", callback_id, e);
            }
        }
    }

    async fn process(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> Result<Option<Answer>, BotError> {
        let sender = &msg.sender;
        self.payments
            .db()
            .upsert_user(sender.id, sender.username.as_deref(), &sender.first_name, now)?;

        let outcome = match &msg.content {
            Content::Command { name, .. } => self.handle_command(msg, name, now).await?,
            Content::Callback(data) => match self.parser.parse_callback(data) {
                Some(action) => self.handle_action(msg, action, now).await?,
                None => {
                    tracing::warn!("Unknown callback data from {}: {}", sender.id, data);
                    Outcome::nothing()
                }
            },
            Content::Text(_) => Outcome::nothing(),
        };

        if let Some(screen) = &outcome.screen {
            self.show(msg, screen).await?;
        }
        if let Some(follow_up) = &outcome.follow_up {
            self.bot.send(msg.chat_id, follow_up).await?;
        }
        Ok(outcome.answer)
    }

    async fn handle_command(&self, msg: &IncomingMessage, name: &str, now: DateTime<Utc>) -> Result<Outcome, BotError> {
        match name {
            "start" => {
                tracing::info!("User {} started the bot", msg.sender.id);
                Ok(Outcome::screen(views::user::main_menu(&msg.sender.first_name)))
            }
            "admin" => {
                if !self.config.is_admin(msg.sender.id) {
                    tracing::warn!("Non-admin {} tried /admin", msg.sender.id);
                    return Ok(Outcome::screen(Reply::text("❌ Access denied. Admin only.")));
                }
                Ok(Outcome::screen(views::admin::panel(&msg.sender.first_name)))
            }
            other => {
                tracing::debug!("Ignoring unknown command /{} at {}", other, now);
                Ok(Outcome::nothing())
            }
        }
    }

    async fn handle_action(&self, msg: &IncomingMessage, action: Action, now: DateTime<Utc>) -> Result<Outcome, BotError> {
        tracing::debug!("User {} pressed {:?}", msg.sender.id, action);

        if action.requires_admin() {
            if !self.config.is_admin(msg.sender.id) {
                tracing::warn!("Non-admin {} pressed {:?}", msg.sender.id, action);
                return Ok(Outcome::answer(Answer::alert("❌ Access denied")));
            }
            return self.handle_admin(msg, action, now).await;
        }

        self.handle_user(msg, action, now).await
    }

    /// Edit the pressed message for callbacks, send a new one otherwise
    async fn show(&self, msg: &IncomingMessage, reply: &Reply) -> Result<(), BotError> {
        match (msg.is_callback(), msg.message_id) {
            (true, Some(message_id)) => self.bot.edit(msg.chat_id, message_id, reply).await,
            _ => self.bot.send(msg.chat_id, reply).await.map(|_| ()),
        }
    }
}
