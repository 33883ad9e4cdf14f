//! Bot API calls against a mock Telegram server

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vip_pay_bot::application::errors::BotError;
use vip_pay_bot::domain::entities::Content;
use vip_pay_bot::domain::traits::{Bot, KeyboardButton, Reply};
use vip_pay_bot::infrastructure::adapters::TelegramAdapter;

const TOKEN: &str = "123456:TEST";

fn adapter(server: &MockServer) -> TelegramAdapter {
    TelegramAdapter::with_api_base(TOKEN, server.uri())
}

fn method_path(name: &str) -> String {
    format!("/bot{}/{}", TOKEN, name)
}

#[tokio::test]
async fn get_me_fills_bot_info() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(method_path("getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "id": 777, "is_bot": true, "first_name": "VIP", "username": "vip_test_bot" }
        })))
        .mount(&server)
        .await;

    let mut bot = adapter(&server);
    bot.fetch_bot_info().await.unwrap();
    let info = bot.bot_info();
    assert_eq!(info.id, "777");
    assert_eq!(info.username, "vip_test_bot");
}

#[tokio::test]
async fn send_carries_markdown_and_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "parse_mode": "Markdown",
            "reply_markup": {
                "inline_keyboard": [[{ "text": "💼 Dashboard", "callback_data": "dashboard" }]]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 55, "chat": { "id": 42 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = Reply::markdown("*hi*").button(KeyboardButton::callback("💼 Dashboard", "dashboard"));
    let id = adapter(&server).send(42, &reply).await.unwrap();
    assert_eq!(id, 55);
}

#[tokio::test]
async fn unchanged_edit_maps_to_not_modified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(method_path("editMessageText")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same"
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .edit(42, 7, &Reply::text("same"))
        .await
        .unwrap_err();
    assert!(err.is_not_modified());
}

#[tokio::test]
async fn api_errors_keep_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).send(42, &Reply::text("hi")).await.unwrap_err();
    match err {
        BotError::Telegram { description } => assert!(description.contains("blocked")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn updates_become_incoming_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(method_path("getUpdates")))
        .and(body_partial_json(json!({ "offset": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                {
                    "update_id": 10,
                    "message": {
                        "message_id": 1,
                        "from": { "id": 42, "first_name": "Bea", "username": "bea" },
                        "chat": { "id": 42 },
                        "text": "/start"
                    }
                },
                {
                    "update_id": 11,
                    "callback_query": {
                        "id": "cb-9",
                        "from": { "id": 42, "first_name": "Bea" },
                        "message": { "message_id": 2, "chat": { "id": 42 } },
                        "data": "buy_vip2"
                    }
                }
            ]
        })))
        .mount(&server)
        .await;

    let bot = adapter(&server);
    let updates = bot.get_updates(10, 0).await.unwrap();
    assert_eq!(TelegramAdapter::get_next_offset(&updates), Some(12));

    let incoming: Vec<_> = updates.iter().filter_map(|u| bot.to_incoming(u)).collect();
    assert_eq!(incoming.len(), 2);
    assert_eq!(
        incoming[0].content,
        Content::Command {
            name: "start".to_string(),
            args: vec![]
        }
    );
    assert_eq!(incoming[1].content, Content::Callback("buy_vip2".to_string()));
    assert_eq!(incoming[1].message_id, Some(2));
    assert_eq!(incoming[1].callback_id.as_deref(), Some("cb-9"));
}

#[tokio::test]
async fn network_errors_do_not_leak_token() {
    // nothing listens on port 1
    let bot = TelegramAdapter::with_api_base(TOKEN, "http://127.0.0.1:1");
    let err = bot.get_updates(0, 0).await.unwrap_err();
    assert!(matches!(err, BotError::Network(_)));
    assert!(!err.to_string().contains(TOKEN));
    assert!(!format!("{:?}", err).contains(TOKEN));
}
