pub mod actions;
mod app_state;
pub mod attachments;
pub mod decoder;
mod settings_store;

pub use app_state::*;
pub use settings_store::*;
