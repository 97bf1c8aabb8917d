//! Reference resolution.
//!
//! Two reference forms are understood:
//!
//! - `{"$ref": "#/definitions/Pet"}`: a JSON pointer into the document the
//!   schema was registered with
//! - `{"$ref": "Pet"}`: a named schema from the shared catalog
//!   (`config/schemas/*.yaml`)
//!
//! Pointers found inside a catalog schema resolve against that catalog schema.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::schema::{ArraySchema, ObjectSchema};
use crate::domain::{SchemaError, SchemaErrors, SchemaNode};

/// Scope name for pointers into the registered document
const ROOT_SCOPE: &str = "<root>";

/// Named schemas reachable through bare-name references
pub type SchemaCatalog = HashMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    catalog: Arc<SchemaCatalog>,
}

impl SchemaResolver {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// Parse and resolve a schema document in one step.
    pub fn resolve_document(&self, document: &Value, root: &Value) -> Result<SchemaNode, SchemaErrors> {
        let node = SchemaNode::from_json(document)?;
        self.resolve(&node, root)
    }

    /// Expand every reference below `node`.
    ///
    /// The result contains no [`SchemaNode::Reference`]. All unresolved and
    /// cyclic references in the tree are reported together.
    pub fn resolve(&self, node: &SchemaNode, root: &Value) -> Result<SchemaNode, SchemaErrors> {
        let mut stack = Vec::new();
        let mut errors = Vec::new();
        let resolved = self.resolve_node(node, root, ROOT_SCOPE, &mut stack, &mut errors);
        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(SchemaErrors(errors))
        }
    }

    fn resolve_node(
        &self,
        node: &SchemaNode,
        root: &Value,
        scope: &str,
        stack: &mut Vec<(String, String)>,
        errors: &mut Vec<SchemaError>,
    ) -> SchemaNode {
        match node {
            SchemaNode::Reference(target) => {
                // Local pointers are only equal within the same document
                let inner_scope = if target.starts_with('#') { scope } else { target.as_str() };
                if let Some(start) = stack.iter().position(|(s, r)| s == inner_scope && r == target) {
                    let mut chain: Vec<String> = stack[start..].iter().map(|(_, r)| r.clone()).collect();
                    chain.push(target.clone());
                    errors.push(SchemaError::CyclicReference(chain));
                    return SchemaNode::Unconstrained;
                }

                let Some((document, inner_root)) = self.lookup(target, root) else {
                    errors.push(SchemaError::UnresolvedReference(target.clone()));
                    return SchemaNode::Unconstrained;
                };

                let parsed = match SchemaNode::from_json(document) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        errors.push(e);
                        return SchemaNode::Unconstrained;
                    }
                };

                stack.push((inner_scope.to_string(), target.clone()));
                let resolved = self.resolve_node(&parsed, inner_root, inner_scope, stack, errors);
                stack.pop();
                resolved
            }
            SchemaNode::Array(array) => SchemaNode::Array(ArraySchema {
                items: Box::new(self.resolve_node(&array.items, root, scope, stack, errors)),
                min_items: array.min_items,
                max_items: array.max_items,
            }),
            SchemaNode::Object(object) => {
                let properties = object
                    .properties
                    .iter()
                    .map(|(name, child)| (name.clone(), self.resolve_node(child, root, scope, stack, errors)))
                    .collect();
                SchemaNode::Object(ObjectSchema {
                    properties,
                    required: object.required.clone(),
                })
            }
            other => other.clone(),
        }
    }

    /// Find the referenced document and the root its own pointers resolve against.
    fn lookup<'a>(&'a self, target: &str, root: &'a Value) -> Option<(&'a Value, &'a Value)> {
        if let Some(pointer) = target.strip_prefix('#') {
            root.pointer(pointer).map(|doc| (doc, root))
        } else {
            self.catalog.get(target).map(|doc| (doc, doc))
        }
    }
}
