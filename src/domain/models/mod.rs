mod action;
mod author;
mod backend;
mod balance;
mod catalog;
mod event;
mod generation;
mod message;
mod preset;
mod settings;
mod slash_commands;
mod stream_error;
mod stream_event;
mod stream_session;

pub use action::*;
pub use author::*;
pub use backend::*;
pub use balance::*;
pub use catalog::*;
pub use event::*;
pub use generation::*;
pub use message::*;
pub use preset::*;
pub use settings::*;
pub use slash_commands::*;
pub use stream_error::*;
pub use stream_event::*;
pub use stream_session::*;
