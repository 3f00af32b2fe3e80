use std::fmt;

use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Pollen,
    Model,
}

impl Author {
    /// Role name used on the chat completions wire.
    pub fn role(&self) -> &'static str {
        match self {
            Author::User => return "user",
            Author::Pollen => return "system",
            Author::Model => return "assistant",
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => return write!(f, "You"),
            Author::Pollen => return write!(f, "Pollen"),
            Author::Model => return write!(f, "Assistant"),
        }
    }
}
