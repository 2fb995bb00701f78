//! Merged entity records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::scope::Scope;
use crate::xml::Element;

/// One canonical entity, assembled from every file that declares it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    /// Contributing files, in merge order
    pub filenames: Vec<String>,
    pub element: Element,
}

impl EntityRecord {
    /// Build a record from a merged top-level element
    pub fn from_element(name: impl Into<String>, element: Element) -> Self {
        Self {
            name: name.into(),
            filenames: element.origins.clone(),
            element,
        }
    }
}

/// Entities by name
pub type EntityMap = BTreeMap<String, EntityRecord>;

/// Everything a scope returns to callers: `array_key -> { name -> record }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeOutput {
    pub scope: Scope,
    pub entities: EntityMap,
}

impl ScopeOutput {
    pub fn new(scope: Scope, entities: EntityMap) -> Self {
        Self { scope, entities }
    }

    pub fn get(&self, name: &str) -> Option<&EntityRecord> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Nested JSON form keyed by the scope's array key
    pub fn to_json(&self) -> serde_json::Result<Value> {
        let mut outer = serde_json::Map::new();
        outer.insert(
            self.scope.array_key().to_string(),
            serde_json::to_value(&self.entities)?,
        );
        Ok(Value::Object(outer))
    }
}
