//! Entity scopes
//!
//! Every scope owns an independent cache namespace: its own index files and its
//! own artifact directory. Scopes never share entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Category of test entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Test cases
    Test,
    /// Page definitions
    Page,
    /// Section definitions
    Section,
    /// Data fixtures
    Data,
    /// Reusable action sequences
    ActionGroup,
}

impl Scope {
    /// All known scopes
    pub const ALL: [Scope; 5] = [
        Scope::Test,
        Scope::Page,
        Scope::Section,
        Scope::Data,
        Scope::ActionGroup,
    ];

    /// Name used as the prefix of the scope's index files (`TestToTime`)
    pub fn name(&self) -> &'static str {
        match self {
            Scope::Test => "Test",
            Scope::Page => "Page",
            Scope::Section => "Section",
            Scope::Data => "Data",
            Scope::ActionGroup => "ActionGroup",
        }
    }

    /// Directory name under `data/` holding the scope's artifacts
    pub fn dir_name(&self) -> &'static str {
        match self {
            Scope::Test => "test",
            Scope::Page => "page",
            Scope::Section => "section",
            Scope::Data => "data",
            Scope::ActionGroup => "action_group",
        }
    }

    /// Root element every source file of this scope must carry
    pub fn root_element(&self) -> &'static str {
        match self {
            Scope::Test => "tests",
            Scope::Page => "pages",
            Scope::Section => "sections",
            Scope::Data => "entities",
            Scope::ActionGroup => "actionGroups",
        }
    }

    /// Element name of a top-level entity declaration
    pub fn entity_element(&self) -> &'static str {
        match self {
            Scope::Test => "test",
            Scope::Page => "page",
            Scope::Section => "section",
            Scope::Data => "entity",
            Scope::ActionGroup => "actionGroup",
        }
    }

    /// Key under which the scope's entities are returned to callers
    pub fn array_key(&self) -> &'static str {
        self.root_element()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace(['-', '_'], "");
        Scope::ALL
            .into_iter()
            .find(|scope| scope.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| CacheError::UnknownScope(s.to_string()))
    }
}
