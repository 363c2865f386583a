//! Schema registry and compiled-validator cache.
//!
//! A [`SchemaCompiler`] maps schema ids to JSON documents and compiles them on
//! demand. Other registered documents a schema `$ref`s are embedded under its
//! `$defs` before compilation and the refs rewritten to point there; refs
//! internal to a document stay internal, so recursive schemas (`"$ref": "#"`)
//! keep working in the root and in referenced documents alike.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{CompileError, SchemaViolation};
use crate::loader::{load_schema_bytes, navigate_fragment, split_reference};
use crate::validator::collect_violations;

/// Keys copied from the root document when compiling a `#/...` fragment.
const FRAGMENT_CONTEXT_KEYS: &[&str] = &["$schema", "$id", "$defs", "definitions"];

/// Thread-safe registry of JSON Schema documents.
///
/// Share it between decoders through an `Arc`; registration and compilation
/// only need `&self`.
#[derive(Default)]
pub struct SchemaCompiler {
    resources: RwLock<HashMap<String, Arc<Value>>>,
    compiled: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

/// A schema ready for validation.
pub struct CompiledSchema {
    reference: String,
    schema: Value,
    validator: jsonschema::Validator,
}

impl CompiledSchema {
    /// The reference this schema was compiled from.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The bundled schema document handed to the validator.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a payload, collecting every violation.
    pub fn validate(&self, payload: &Value) -> Result<(), Vec<SchemaViolation>> {
        let errors = collect_violations(&self.validator, payload);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl SchemaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema document under `id`, replacing any previous one.
    pub fn add_resource(&self, id: impl Into<String>, schema: Value) {
        let id = id.into();
        debug!(id = %id, "registering JSON Schema resource");
        write(&self.resources).insert(id, Arc::new(schema));
        // Bundles may have embedded the old document.
        write(&self.compiled).clear();
    }

    /// Parse and register raw JSON bytes under `id`.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidJson` if the bytes aren't valid JSON.
    pub fn add_raw_resource(&self, id: impl Into<String>, raw: &[u8]) -> Result<(), CompileError> {
        let schema = load_schema_bytes(raw)?;
        self.add_resource(id, schema);
        Ok(())
    }

    /// Register raw JSON bytes under an id derived from their content.
    ///
    /// Returns the id, e.g. `3f2a9c1b0d4e5f67.json`.
    pub fn add_raw(&self, raw: &[u8]) -> Result<String, CompileError> {
        let id = raw_resource_id(raw);
        self.add_raw_resource(id.clone(), raw)?;
        Ok(id)
    }

    /// Returns true if a document is registered for the id part of `reference`.
    pub fn contains(&self, reference: &str) -> bool {
        let (id, _) = split_reference(reference);
        read(&self.resources).contains_key(id)
    }

    /// The registered document for the id part of `reference`.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnknownReference` if nothing is registered.
    pub fn document(&self, reference: &str) -> Result<Arc<Value>, CompileError> {
        let (id, _) = split_reference(reference);
        read(&self.resources)
            .get(id)
            .cloned()
            .ok_or_else(|| CompileError::UnknownReference {
                reference: reference.to_string(),
            })
    }

    /// Compile (or fetch the cached compilation of) `reference`.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnknownReference` for unregistered documents,
    /// `CompileError::BundleError` for a `$ref` fragment missing from another
    /// registered document, and `CompileError::InvalidSchema` if the validator rejects the schema.
    pub fn compile(&self, reference: &str) -> Result<Arc<CompiledSchema>, CompileError> {
        if let Some(hit) = read(&self.compiled).get(reference) {
            trace!(reference, "using cached JSON Schema");
            return Ok(Arc::clone(hit));
        }

        let (id, fragment) = split_reference(reference);
        let document = self.document(reference)?;

        let mut bundled = (*document).clone();
        let mut bundler = Bundler::new(self, id, &bundled);
        bundler.rewrite(&mut bundled, None)?;
        bundler.finish(&mut bundled);

        let schema = match fragment {
            Some(frag) if frag.trim_start_matches('#').is_empty() => bundled,
            Some(frag) => {
                navigate_fragment(&bundled, frag)?;
                wrap_fragment(&bundled, frag)
            }
            None => bundled,
        };

        let validator =
            jsonschema::validator_for(&schema).map_err(|e| CompileError::InvalidSchema {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        let compiled = Arc::new(CompiledSchema {
            reference: reference.to_string(),
            schema,
            validator,
        });
        write(&self.compiled).insert(reference.to_string(), Arc::clone(&compiled));
        debug!(reference, "compiled JSON Schema");

        Ok(compiled)
    }
}

impl fmt::Debug for SchemaCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resources = read(&self.resources);
        let mut ids: Vec<&String> = resources.keys().collect();
        ids.sort();
        f.debug_struct("SchemaCompiler")
            .field("resources", &ids)
            .finish_non_exhaustive()
    }
}

/// Id under which raw schema bytes are registered.
pub fn raw_resource_id(raw: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    format!("{:016x}.json", hasher.finish())
}

/// Embeds the registered documents a root schema refers to under the root's
/// `$defs`, rewriting `$ref`s to point there.
///
/// Embedded documents keep their own structure, so recursion inside them
/// (`"$ref": "#"`) and cycles between documents stay plain internal refs.
struct Bundler<'a> {
    compiler: &'a SchemaCompiler,
    root_id: &'a str,
    /// Registry id to `$defs` key.
    embedded: HashMap<String, String>,
    defs: Map<String, Value>,
    taken: HashSet<String>,
}

impl<'a> Bundler<'a> {
    fn new(compiler: &'a SchemaCompiler, root_id: &'a str, root: &Value) -> Self {
        let taken = root
            .get("$defs")
            .and_then(Value::as_object)
            .map(|defs| defs.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            compiler,
            root_id,
            embedded: HashMap::new(),
            defs: Map::new(),
            taken,
        }
    }

    /// Rewrite the `$ref`s in `schema`.
    ///
    /// `base` is the `$defs` key of the embedded document `schema` belongs to,
    /// or `None` for the root document, whose internal refs stay as they are.
    fn rewrite(&mut self, schema: &mut Value, base: Option<&str>) -> Result<(), CompileError> {
        match schema {
            Value::Object(obj) => {
                if let Some(Value::String(reference)) = obj.get_mut("$ref") {
                    if let Some(target) = self.target(reference.as_str(), base)? {
                        *reference = target;
                    }
                }
                for value in obj.values_mut() {
                    self.rewrite(value, base)?;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.rewrite(item, base)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The rewritten form of `reference`, or `None` to keep it.
    fn target(&mut self, reference: &str, base: Option<&str>) -> Result<Option<String>, CompileError> {
        let (id, fragment) = split_reference(reference);
        let fragment = fragment.unwrap_or("");
        if !is_pointer(fragment) {
            // Anchors are left for the validator
            return Ok(None);
        }

        if id.is_empty() {
            return Ok(base.map(|key| def_pointer(key, fragment)));
        }
        if id == self.root_id {
            let local = if fragment.is_empty() { "#" } else { fragment };
            return Ok(Some(local.to_string()));
        }
        if !self.compiler.contains(id) {
            // Unknown document - leave for the validator
            return Ok(None);
        }

        navigate_fragment(&*self.compiler.document(id)?, fragment)?;
        let key = self.embed(id)?;
        Ok(Some(def_pointer(&key, fragment)))
    }

    fn embed(&mut self, id: &str) -> Result<String, CompileError> {
        if let Some(key) = self.embedded.get(id) {
            return Ok(key.clone());
        }
        let key = self.allocate_key(id);
        self.embedded.insert(id.to_string(), key.clone());

        let mut document = (*self.compiler.document(id)?).clone();
        if let Value::Object(obj) = &mut document {
            // Embedded documents resolve against the root's base URI
            obj.remove("$id");
            obj.remove("$schema");
        }
        self.rewrite(&mut document, Some(key.as_str()))?;
        trace!(id, key = %key, "embedded referenced JSON Schema");
        self.defs.insert(key.clone(), document);
        Ok(key)
    }

    fn allocate_key(&mut self, id: &str) -> String {
        let base: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let mut key = base.clone();
        let mut n = 1;
        while !self.taken.insert(key.clone()) {
            n += 1;
            key = format!("{}_{}", base, n);
        }
        key
    }

    /// Add the embedded documents to the root's `$defs`.
    fn finish(self, root: &mut Value) {
        if self.defs.is_empty() {
            return;
        }
        if let Value::Object(obj) = root {
            let defs = obj
                .entry("$defs")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(defs) = defs {
                defs.extend(self.defs);
            }
        }
    }
}

fn is_pointer(fragment: &str) -> bool {
    fragment.is_empty() || fragment == "#" || fragment.starts_with("#/")
}

fn def_pointer(key: &str, fragment: &str) -> String {
    format!("#/$defs/{}{}", key, fragment.trim_start_matches('#'))
}

/// Root-level wrapper that validates against `fragment` while keeping the
/// root's definitions reachable.
fn wrap_fragment(root: &Value, fragment: &str) -> Value {
    let mut wrapper = Map::new();
    if let Value::Object(map) = root {
        for key in FRAGMENT_CONTEXT_KEYS {
            if let Some(value) = map.get(*key) {
                wrapper.insert((*key).to_string(), value.clone());
            }
        }
    }
    wrapper.insert("$ref".to_string(), Value::String(fragment.to_string()));
    Value::Object(wrapper)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer", "minimum": 0 }
            },
            "required": ["name"]
        })
    }

    #[test]
    fn compile_and_validate() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource("person.json", person_schema());

        let schema = compiler.compile("person.json").unwrap();
        assert_eq!(schema.reference(), "person.json");
        assert!(schema.validate(&json!({ "name": "Ada", "age": 36 })).is_ok());

        let errors = schema.validate(&json!({ "age": -1 })).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn compile_unknown_reference() {
        let compiler = SchemaCompiler::new();
        let result = compiler.compile("missing.json");
        assert!(matches!(result, Err(CompileError::UnknownReference { .. })));
    }

    #[test]
    fn compile_invalid_schema() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource("bad.json", json!({ "type": 12 }));
        let result = compiler.compile("bad.json");
        assert!(matches!(result, Err(CompileError::InvalidSchema { .. })));
    }

    #[test]
    fn compile_is_cached_until_resources_change() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource("person.json", person_schema());

        let first = compiler.compile("person.json").unwrap();
        let second = compiler.compile("person.json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        compiler.add_resource("other.json", json!({}));
        let third = compiler.compile("person.json").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn raw_resources_get_content_ids() {
        let compiler = SchemaCompiler::new();
        let raw = br#"{"type":"object"}"#;
        let id = compiler.add_raw(raw).unwrap();
        assert_eq!(id, raw_resource_id(raw));
        assert!(id.ends_with(".json"));
        assert!(compiler.contains(&id));
        assert!(compiler.add_raw(b"not json").is_err());
    }

    #[test]
    fn cross_document_refs_are_embedded_in_defs() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource(
            "address.json",
            json!({
                "$id": "address.json",
                "$defs": { "city": { "type": "string", "minLength": 2 } },
                "type": "object",
                "properties": { "city": { "$ref": "#/$defs/city" } }
            }),
        );
        compiler.add_resource(
            "user.json",
            json!({
                "type": "object",
                "properties": {
                    "address": { "$ref": "address.json" },
                    "city": { "$ref": "address.json#/$defs/city" }
                }
            }),
        );

        let schema = compiler.compile("user.json").unwrap();
        let bundled = schema.schema();
        assert_eq!(bundled["properties"]["address"]["$ref"], "#/$defs/address_json");
        assert_eq!(
            bundled["properties"]["city"]["$ref"],
            "#/$defs/address_json/$defs/city"
        );
        let embedded = &bundled["$defs"]["address_json"];
        assert!(embedded.get("$id").is_none());
        assert_eq!(
            embedded["properties"]["city"]["$ref"],
            "#/$defs/address_json/$defs/city"
        );

        assert!(schema
            .validate(&json!({ "address": { "city": "X" } }))
            .is_err());
        assert!(schema.validate(&json!({ "city": "X" })).is_err());
        assert!(schema
            .validate(&json!({ "address": { "city": "Berlin" }, "city": "Rome" }))
            .is_ok());
    }

    #[test]
    fn embedded_keys_do_not_clobber_existing_defs() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource("name.json", json!({ "type": "string", "minLength": 3 }));
        compiler.add_resource(
            "user.json",
            json!({
                "$defs": { "name_json": { "type": "integer" } },
                "type": "object",
                "properties": {
                    "name": { "$ref": "name.json" },
                    "count": { "$ref": "#/$defs/name_json" }
                }
            }),
        );

        let schema = compiler.compile("user.json").unwrap();
        assert_eq!(schema.schema()["properties"]["name"]["$ref"], "#/$defs/name_json_2");
        assert!(schema.validate(&json!({ "name": "Ada", "count": 1 })).is_ok());
        assert!(schema.validate(&json!({ "name": "Al" })).is_err());
        assert!(schema.validate(&json!({ "count": "one" })).is_err());
    }

    #[test]
    fn recursion_inside_referenced_documents_compiles() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource(
            "tree.json",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "child": { "$ref": "#" }
                }
            }),
        );
        compiler.add_resource(
            "user.json",
            json!({
                "type": "object",
                "properties": { "tree": { "$ref": "tree.json" } }
            }),
        );

        let schema = compiler.compile("user.json").unwrap();
        assert_eq!(
            schema.schema()["$defs"]["tree_json"]["properties"]["child"]["$ref"],
            "#/$defs/tree_json"
        );
        assert!(schema
            .validate(&json!({ "tree": { "name": "a", "child": { "name": "b" } } }))
            .is_ok());
        assert!(schema
            .validate(&json!({ "tree": { "name": "a", "child": { "child": { "name": "" } } } }))
            .is_err());
    }

    #[test]
    fn circular_cross_document_refs_compile() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource(
            "a.json",
            json!({ "type": "object", "properties": { "b": { "$ref": "b.json" }, "n": { "type": "integer" } } }),
        );
        compiler.add_resource(
            "b.json",
            json!({ "type": "object", "properties": { "a": { "$ref": "a.json" } } }),
        );

        let schema = compiler.compile("a.json").unwrap();
        assert_eq!(schema.schema()["$defs"]["b_json"]["properties"]["a"]["$ref"], "#");
        assert!(schema.validate(&json!({ "b": { "a": { "n": 1 } } })).is_ok());
        assert!(schema.validate(&json!({ "b": { "a": { "n": "x" } } })).is_err());
    }

    #[test]
    fn missing_fragment_in_referenced_document_fails() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource("a.json", json!({ "$defs": {} }));
        compiler.add_resource(
            "user.json",
            json!({ "properties": { "x": { "$ref": "a.json#/$defs/missing" } } }),
        );

        let result = compiler.compile("user.json");
        assert!(matches!(result, Err(CompileError::BundleError { .. })));
    }

    #[test]
    fn internal_recursion_is_left_to_the_validator() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource(
            "node.json",
            json!({
                "type": "object",
                "properties": {
                    "value": { "type": "number" },
                    "next": { "$ref": "#" }
                }
            }),
        );

        let schema = compiler.compile("node.json").unwrap();
        assert!(schema
            .validate(&json!({ "value": 1, "next": { "value": 2 } }))
            .is_ok());
        assert!(schema
            .validate(&json!({ "value": 1, "next": { "value": "two" } }))
            .is_err());
    }

    #[test]
    fn fragment_references_keep_definitions() {
        let compiler = SchemaCompiler::new();
        compiler.add_resource(
            "defs.json",
            json!({
                "$defs": {
                    "name": { "type": "string" },
                    "person": {
                        "type": "object",
                        "properties": { "name": { "$ref": "#/$defs/name" } }
                    }
                }
            }),
        );

        let schema = compiler.compile("defs.json#/$defs/person").unwrap();
        assert!(schema.validate(&json!({ "name": "Ada" })).is_ok());
        assert!(schema.validate(&json!({ "name": 1 })).is_err());
    }
}
