use std::fmt;

use serde::{Deserialize, Serialize};

/// A method or property name as the scripting engine sees it.
///
/// Script identifiers are either strings (`obj.foo`) or integers (`arr[3]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    Name(String),
    Index(i32),
}

impl Identifier {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identifier::Name(name) => Some(name),
            Identifier::Index(_) => None,
        }
    }

    pub fn index(&self) -> Option<i32> {
        match self {
            Identifier::Index(index) => Some(*index),
            Identifier::Name(_) => None,
        }
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Identifier::Name(name)
    }
}

impl From<i32> for Identifier {
    fn from(index: i32) -> Self {
        Identifier::Index(index)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Name(name) => f.write_str(name),
            Identifier::Index(index) => write!(f, "[{index}]"),
        }
    }
}
