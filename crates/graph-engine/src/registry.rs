//! Node type registry with legacy-label resolution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::definition::{DefinitionNode, NodeDefinition};
use crate::node::{Node, NodeServices};

/// Builds a fresh node instance wired to the shared services
pub type NodeFactory = Box<dyn Fn(Arc<NodeServices>) -> Box<dyn Node> + Send + Sync>;

struct RegisteredType {
    label: String,
    factory: NodeFactory,
}

/// Outcome of resolving one saved node record against the registry
pub enum Resolution<'a> {
    /// A concrete executable type matched
    Resolved {
        type_id: &'a str,
        factory: &'a NodeFactory,
    },
    /// Editor-only decoration, silently skipped at load
    UiOnly,
    /// Nothing matched; the record is skipped with a warning
    Unknown,
}

/// Summary row for the type listing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct NodeTypeInfo {
    pub type_id: String,
    pub label: String,
}

/// Maps stored node identifiers to factories.
///
/// Graphs saved by older frontends carry the display label where the type id
/// belongs, so resolution falls back through the label index before giving up.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, RegisteredType>,
    labels: HashMap<String, String>,
    ui_only: HashSet<String>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executable type under `type_id` with its display label
    pub fn register<F>(&mut self, type_id: &str, label: &str, factory: F)
    where
        F: Fn(Arc<NodeServices>) -> Box<dyn Node> + Send + Sync + 'static,
    {
        if self.factories.contains_key(type_id) {
            tracing::warn!(type_id, "replacing node type registration");
        }
        self.factories.insert(
            type_id.to_string(),
            RegisteredType {
                label: label.to_string(),
                factory: Box::new(factory),
            },
        );
        self.labels.insert(label.to_string(), type_id.to_string());
    }

    /// Register a table-driven definition
    pub fn register_definition(&mut self, def: &'static NodeDefinition) {
        self.register(def.type_id, def.label, move |services| {
            Box::new(DefinitionNode::new(def, services.clock.clone()))
        });
    }

    /// Mark a saved identifier as editor-only decoration
    pub fn mark_ui_only(&mut self, label: &str) {
        self.ui_only.insert(label.to_string());
    }

    /// Resolve a saved record's `type` field (and legacy label fallback)
    #[must_use]
    pub fn resolve(&self, type_id: Option<&str>, label: Option<&str>) -> Resolution<'_> {
        // Modern records: the type field holds the machine id
        if let Some(id) = type_id {
            if let Some((key, registered)) = self.factories.get_key_value(id) {
                return Resolution::Resolved {
                    type_id: key,
                    factory: &registered.factory,
                };
            }
            // Legacy records stored the display label in the type field
            if let Some(mapped) = self.labels.get(id) {
                if let Some((key, registered)) = self.factories.get_key_value(mapped) {
                    return Resolution::Resolved {
                        type_id: key,
                        factory: &registered.factory,
                    };
                }
            }
        }
        // Oldest records: only a label field
        if let Some(label) = label {
            if let Some(mapped) = self.labels.get(label) {
                if let Some((key, registered)) = self.factories.get_key_value(mapped) {
                    return Resolution::Resolved {
                        type_id: key,
                        factory: &registered.factory,
                    };
                }
            }
            if let Some((key, registered)) = self.factories.get_key_value(label) {
                return Resolution::Resolved {
                    type_id: key,
                    factory: &registered.factory,
                };
            }
        }
        let decorative = type_id.is_some_and(|id| self.ui_only.contains(id))
            || label.is_some_and(|l| self.ui_only.contains(l));
        if decorative {
            Resolution::UiOnly
        } else {
            Resolution::Unknown
        }
    }

    /// Factory for an exact type id, without legacy fallbacks
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&NodeFactory> {
        self.factories
            .get(type_id)
            .map(|registered| &registered.factory)
    }

    #[must_use]
    pub fn has(&self, type_id: &str) -> bool {
        self.factories.contains_key(type_id)
    }

    /// Display label for a registered type id
    #[must_use]
    pub fn label_for(&self, type_id: &str) -> Option<String> {
        self.factories
            .get(type_id)
            .map(|registered| registered.label.clone())
    }

    /// All registered types, sorted by id
    #[must_use]
    pub fn list(&self) -> Vec<NodeTypeInfo> {
        let mut types: Vec<NodeTypeInfo> = self
            .factories
            .iter()
            .map(|(type_id, registered)| NodeTypeInfo {
                type_id: type_id.clone(),
                label: registered.label.clone(),
            })
            .collect();
        types.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        types
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
