//! Screen and notification builders
//!
//! Everything here is pure: data in, [`Reply`](crate::domain::traits::Reply) out.
//! Handlers decide whether a screen is sent fresh or edited in place.

pub mod admin;
pub mod notify;
pub mod user;

use chrono::{DateTime, Utc};

use crate::domain::traits::KeyboardButton;

/// `HH:MM:SS`, appended to screens that can be refreshed so every edit differs
pub fn stamp(now: DateTime<Utc>) -> String {
    now.format("%H:%M:%S").to_string()
}

pub(crate) fn back(callback: &str) -> KeyboardButton {
    KeyboardButton::callback("⬅ Back", callback)
}

pub(crate) fn refresh(callback: &str) -> KeyboardButton {
    KeyboardButton::callback("🔄 Refresh", callback)
}

/// Generic failure shown when a handler errors out
pub const ERROR_TEXT: &str = "❌ An error occurred. Please try again later.";
