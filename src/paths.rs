//! Schema path listing.
//!
//! Flattens a JSON Schema into dotted property paths with their declared
//! types, e.g. `traits.address.city: string`. Circular `$ref`s are expanded
//! at most `max_depth` times along any branch.

use std::sync::Arc;

use serde_json::Value;

use crate::compiler::SchemaCompiler;
use crate::error::CompileError;
use crate::loader::{navigate_fragment, split_reference};
use crate::types::{PathType, SchemaPath};

/// Keywords whose branches contribute properties to the enclosing object.
const COMPOSITION_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf"];

/// List every property path of the schema at `reference`, sorted by name.
///
/// # Errors
///
/// Returns `CompileError::UnknownReference` if `reference` or a `$ref` names
/// an unregistered document, and `CompileError::BundleError` if a `$ref`
/// fragment doesn't exist.
pub fn list_paths(
    reference: &str,
    compiler: &SchemaCompiler,
    max_depth: u8,
) -> Result<Vec<SchemaPath>, CompileError> {
    let (id, fragment) = split_reference(reference);
    let document = Document {
        id: id.to_string(),
        root: compiler.document(reference)?,
    };
    let schema = navigate_fragment(&document.root, fragment.unwrap_or(""))?.clone();

    let mut walker = PathWalker {
        compiler,
        max_depth: usize::from(max_depth),
        stack: Vec::new(),
        paths: Vec::new(),
    };
    walker.walk_properties(&document, &schema, "")?;

    let mut paths = walker.paths;
    paths.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(paths)
}

#[derive(Clone)]
struct Document {
    id: String,
    root: Arc<Value>,
}

/// A schema with its `$ref` chain followed.
struct Resolved {
    document: Document,
    schema: Value,
    /// Refs followed to get here, as `id#fragment` keys.
    refs: Vec<String>,
}

struct PathWalker<'a> {
    compiler: &'a SchemaCompiler,
    max_depth: usize,
    /// Refs expanded on the current branch.
    stack: Vec<String>,
    paths: Vec<SchemaPath>,
}

impl PathWalker<'_> {
    fn walk_properties(
        &mut self,
        document: &Document,
        schema: &Value,
        prefix: &str,
    ) -> Result<(), CompileError> {
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (key, property) in properties {
                let Some(resolved) = self.resolve(document, property)? else {
                    continue;
                };
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };

                let ty = self.classify(&resolved.document, &resolved.schema)?;
                self.paths.push(SchemaPath::new(name.clone(), ty));

                if ty == PathType::Object {
                    self.descend(resolved, &name)?;
                }
            }
        }

        for keyword in COMPOSITION_KEYWORDS {
            if let Some(Value::Array(branches)) = schema.get(*keyword) {
                for branch in branches {
                    if let Some(resolved) = self.resolve(document, branch)? {
                        self.descend(resolved, prefix)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn descend(&mut self, resolved: Resolved, prefix: &str) -> Result<(), CompileError> {
        let Resolved {
            document,
            schema,
            refs,
        } = resolved;
        let depth = self.stack.len();
        self.stack.extend(refs);
        let result = self.walk_properties(&document, &schema, prefix);
        self.stack.truncate(depth);
        result
    }

    /// Follow `$ref`s. Returns `None` if a ref would exceed the depth bound.
    fn resolve(&self, document: &Document, schema: &Value) -> Result<Option<Resolved>, CompileError> {
        let mut document = document.clone();
        let mut schema = schema.clone();
        let mut refs: Vec<String> = Vec::new();

        while let Some(ref_val) = schema.get("$ref").and_then(Value::as_str).map(String::from) {
            let (id, fragment) = split_reference(&ref_val);
            let fragment = fragment.unwrap_or("");
            if !id.is_empty() {
                document = Document {
                    id: id.to_string(),
                    root: self.compiler.document(id)?,
                };
            }

            let key = format!("{}#{}", document.id, fragment.trim_start_matches('#'));
            let seen = self
                .stack
                .iter()
                .chain(refs.iter())
                .filter(|k| **k == key)
                .count();
            if seen >= self.max_depth {
                return Ok(None);
            }

            schema = navigate_fragment(&document.root, fragment)?.clone();
            refs.push(key);
        }

        Ok(Some(Resolved {
            document,
            schema,
            refs,
        }))
    }

    fn classify(&self, document: &Document, schema: &Value) -> Result<PathType, CompileError> {
        match declared_type(schema) {
            Some("array") => self.classify_array(document, schema),
            Some(name) => Ok(PathType::from_scalar_name(name).unwrap_or(PathType::String)),
            None if schema.get("properties").is_some() => Ok(PathType::Object),
            None if schema.get("items").is_some() => self.classify_array(document, schema),
            None => Ok(PathType::String),
        }
    }

    fn classify_array(&self, document: &Document, schema: &Value) -> Result<PathType, CompileError> {
        let item = match schema.get("items") {
            Some(items @ Value::Object(_)) => self
                .resolve(document, items)?
                .and_then(|resolved| item_type(&resolved.schema)),
            _ => None,
        };
        Ok(PathType::array_of(item))
    }
}

/// The `type` keyword, using the first non-null entry of a type list.
fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn item_type(schema: &Value) -> Option<PathType> {
    match declared_type(schema) {
        Some(name) => PathType::from_scalar_name(name),
        None if schema.get("properties").is_some() => Some(PathType::Object),
        None => None,
    }
}
