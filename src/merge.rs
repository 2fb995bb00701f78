//! Document merging
//!
//! [`MergeCapability`] is the seam between the cache engine and the document
//! model of a scope: it parses a file, folds further files into the same
//! document, validates, and flattens the result into entity records.
//! [`XmlMerger`] is the element-tree implementation used for every built-in
//! scope.

use std::collections::HashSet;

use tracing::debug;

use crate::entity::{EntityMap, EntityRecord};
use crate::error::{CacheError, Result};
use crate::scope::Scope;
use crate::validation::{EntitySchema, ErrorCollector, ValidationIssue};
use crate::xml::{self, Element, NAME_ATTRIBUTE};

/// Attributes identifying a node among its siblings, in priority order
pub const DEFAULT_ID_ATTRIBUTES: &[&str] = &["name", "stepKey", "key", "mergeKey"];

/// Parse, merge and flatten documents of one scope
pub trait MergeCapability {
    type Document;

    /// Scope handled by this merger
    fn scope(&self) -> Scope;

    /// Names of the entities a file declares, without a full parse
    fn prescan(&self, content: &str, file: &str) -> Result<Vec<String>> {
        xml::entity_names(content, file)
    }

    /// Start a fresh document from the first file of a pass
    fn parse(&self, content: &str, file: &str, errors: &mut ErrorCollector) -> Result<Self::Document>;

    /// Fold another file into an existing document
    fn merge(
        &self,
        document: &mut Self::Document,
        content: &str,
        file: &str,
        errors: &mut ErrorCollector,
    ) -> Result<()>;

    /// Schema-validate the document; with `file` set, only what that file contributed
    fn validate(&self, document: &Self::Document, file: Option<&str>, errors: &mut ErrorCollector);

    /// Flatten the document into entity records
    fn to_entity_mapping(&self, document: &Self::Document) -> Result<EntityMap>;
}

/// Merged element tree for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub root: Element,
}

/// Element-tree merger
#[derive(Debug)]
pub struct XmlMerger {
    scope: Scope,
    id_attributes: Vec<String>,
    schema: EntitySchema,
}

impl XmlMerger {
    /// Merger using the scope's built-in entity schema
    pub fn new(scope: Scope) -> Result<Self> {
        Ok(Self::with_schema(EntitySchema::builtin(scope)?))
    }

    pub fn with_schema(schema: EntitySchema) -> Self {
        Self {
            scope: schema.scope(),
            id_attributes: DEFAULT_ID_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            schema,
        }
    }

    pub fn with_id_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// First identifier attribute carried by `element`
    fn identifier<'a>(&self, element: &'a Element) -> Option<(&'a str, &'a str)> {
        self.id_attributes.iter().find_map(|attr| {
            element
                .attributes
                .get_key_value(attr.as_str())
                .map(|(k, v)| (k.as_str(), v.as_str()))
        })
    }

    fn parse_root(&self, content: &str, file: &str, errors: &mut ErrorCollector) -> Result<Element> {
        let root = xml::parse_document(content, file)?;
        let expected = self.scope.root_element();
        if root.name != expected {
            return Err(CacheError::RootMismatch {
                file: file.to_string(),
                expected: expected.to_string(),
                found: root.name,
            });
        }
        self.check_duplicates(&root, file, errors);
        Ok(root)
    }

    /// Siblings sharing element name and identifier within one file
    fn check_duplicates(&self, element: &Element, file: &str, errors: &mut ErrorCollector) {
        let mut seen = HashSet::new();
        for child in &element.children {
            if let Some((attr, value)) = self.identifier(child) {
                if !seen.insert((child.name.as_str(), attr, value)) {
                    errors.add(ValidationIssue {
                        files: vec![file.to_string()],
                        entity: element
                            .attribute(NAME_ATTRIBUTE)
                            .or_else(|| child.attribute(NAME_ATTRIBUTE))
                            .map(String::from),
                        message: format!(
                            "element <{}> with {}=\"{}\" is declared more than once",
                            child.name, attr, value
                        ),
                    });
                }
            }
            self.check_duplicates(child, file, errors);
        }
    }

    fn merge_element(&self, target: &mut Element, incoming: Element) {
        target.attributes.extend(incoming.attributes);
        if incoming.text.is_some() {
            target.text = incoming.text;
        }
        for origin in &incoming.origins {
            target.add_origin(origin);
        }

        for child in incoming.children {
            let id = self.identifier(&child);
            let position = target
                .children
                .iter()
                .position(|existing| existing.name == child.name && self.identifier(existing) == id);
            match position {
                Some(idx) => self.merge_element(&mut target.children[idx], child),
                None => target.children.push(child),
            }
        }
    }
}

impl MergeCapability for XmlMerger {
    type Document = MergedDocument;

    fn scope(&self) -> Scope {
        self.scope
    }

    fn parse(&self, content: &str, file: &str, errors: &mut ErrorCollector) -> Result<MergedDocument> {
        Ok(MergedDocument {
            root: self.parse_root(content, file, errors)?,
        })
    }

    fn merge(
        &self,
        document: &mut MergedDocument,
        content: &str,
        file: &str,
        errors: &mut ErrorCollector,
    ) -> Result<()> {
        let incoming = self.parse_root(content, file, errors)?;
        self.merge_element(&mut document.root, incoming);
        Ok(())
    }

    fn validate(&self, document: &MergedDocument, file: Option<&str>, errors: &mut ErrorCollector) {
        for entity in &document.root.children {
            if let Some(file) = file {
                if !entity.origins.iter().any(|o| o == file) {
                    continue;
                }
            }
            self.schema.validate_entity(entity, errors);
        }
    }

    fn to_entity_mapping(&self, document: &MergedDocument) -> Result<EntityMap> {
        let mut entities = EntityMap::new();
        for element in &document.root.children {
            if element.name != self.scope.entity_element() {
                debug!("skipping <{}> under <{}>", element.name, document.root.name);
                continue;
            }
            let Some(name) = element.attribute(NAME_ATTRIBUTE) else {
                debug!("skipping unnamed <{}>", element.name);
                continue;
            };
            entities.insert(
                name.to_string(),
                EntityRecord::from_element(name, element.clone()),
            );
        }
        Ok(entities)
    }
}
