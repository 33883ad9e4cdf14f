//! Message handling - Parsing, routing and the handlers behind every button

mod admin;
pub mod dispatcher;
mod handlers;
pub mod parser;

pub use dispatcher::{Answer, MessageDispatcher, Outcome};
pub use parser::{Action, MessageParser};
