//! Schema validation and error aggregation
//!
//! Validation failures are never short-circuited: every issue found during a
//! pass is pushed into an [`ErrorCollector`] and reported together once the
//! pass is over.

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

use crate::error::{CacheError, Result};
use crate::scope::Scope;
use crate::xml::Element;

/// How eagerly documents are validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// No schema validation
    None,
    /// Validate the fully merged document once
    #[default]
    Default,
    /// Validate after every file is merged
    Developer,
}

impl std::str::FromStr for DebugLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(DebugLevel::None),
            "default" => Ok(DebugLevel::Default),
            "developer" => Ok(DebugLevel::Developer),
            other => Err(format!("unknown debug level '{}'", other)),
        }
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Files the offending node came from
    pub files: Vec<String>,
    pub entity: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.files.is_empty() {
            write!(f, "[{}] ", self.files.join(", "))?;
        }
        if let Some(entity) = &self.entity {
            write!(f, "{}: ", entity)?;
        }
        f.write_str(&self.message)
    }
}

/// Every issue collected during a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s):", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Accumulates validation issues across files
#[derive(Debug, Default)]
pub struct ErrorCollector {
    issues: Vec<ValidationIssue>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Fail with every collected issue, if any
    pub fn finish(self) -> Result<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Validation(ValidationErrors {
                issues: self.issues,
            }))
        }
    }
}

/// JSON Schema every entity of a scope must satisfy.
///
/// Entities are checked in their serialized element form:
/// `{"name": "test", "attributes": {...}, "children": [...]}`.
pub struct EntitySchema {
    scope: Scope,
    compiled: JSONSchema,
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema").field("scope", &self.scope).finish()
    }
}

impl EntitySchema {
    /// Built-in schema: the scope's entity element with a non-empty `name`
    pub fn builtin(scope: Scope) -> Result<Self> {
        let schema = json!({
            "type": "object",
            "required": ["name", "attributes"],
            "properties": {
                "name": { "const": scope.entity_element() },
                "attributes": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 }
                    }
                }
            }
        });
        Self::compile(scope, &schema)
    }

    pub fn compile(scope: Scope, schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema).map_err(|e| CacheError::InvalidSchema {
            scope: scope.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { scope, compiled })
    }

    /// Load `<dir>/<scope>.schema.json`, falling back to the built-in schema
    pub fn load_or_builtin(scope: Scope, schema_dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = schema_dir else {
            return Self::builtin(scope);
        };
        let path = dir.join(format!("{}.schema.json", scope.dir_name()));
        if !path.is_file() {
            return Self::builtin(scope);
        }
        let content = std::fs::read_to_string(&path)?;
        let schema: Value = serde_json::from_str(&content)?;
        Self::compile(scope, &schema)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Validate one entity element, pushing any failures into `errors`
    pub fn validate_entity(&self, entity: &Element, errors: &mut ErrorCollector) {
        let instance = match serde_json::to_value(entity) {
            Ok(value) => value,
            Err(e) => {
                errors.add(ValidationIssue {
                    files: entity.origins.clone(),
                    entity: entity.attribute(crate::xml::NAME_ATTRIBUTE).map(String::from),
                    message: e.to_string(),
                });
                return;
            }
        };

        let result = self.compiled.validate(&instance);
        if let Err(failures) = result {
            for failure in failures {
                let path = failure.instance_path.to_string();
                let message = if path.is_empty() {
                    failure.to_string()
                } else {
                    format!("{} (at {})", failure, path)
                };
                errors.add(ValidationIssue {
                    files: entity.origins.clone(),
                    entity: entity.attribute(crate::xml::NAME_ATTRIBUTE).map(String::from),
                    message,
                });
            }
        }
    }
}
