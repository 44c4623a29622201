//! Collection descriptors (spec §3): schema + enabled-event set for one
//! collection, persisted as a YAML file under the collection's directory
//! and cached in memory by [`DescriptorStore`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl PropertyType {
    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyType::String, Value::String(_)) => true,
            (PropertyType::Date, Value::String(_)) => true,
            (PropertyType::Number, Value::Number(_)) => true,
            (PropertyType::Boolean, Value::Bool(_)) => true,
            (PropertyType::Array, Value::Array(_)) => true,
            (PropertyType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
    /// Events this collection runs handlers for. Empty means "all events
    /// whose handler file is present are honored" — the common case.
    #[serde(default)]
    pub enabled_events: HashSet<String>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), properties: BTreeMap::new(), enabled_events: HashSet::new() }
    }

    pub fn event_enabled(&self, event: &str) -> bool {
        self.enabled_events.is_empty() || self.enabled_events.contains(event)
    }

    /// Protected/hidden field names declared in the schema, ahead of
    /// whatever a handler adds to the request-scoped sets.
    pub fn protected_fields(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().filter(|(_, p)| p.protected).map(|(name, _)| name.as_str())
    }

    pub fn hidden_fields(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().filter(|(_, p)| p.hidden).map(|(name, _)| name.as_str())
    }

    /// Fill in each property's declared `default` for any field the
    /// document doesn't already set. Runs ahead of `type_check` so a
    /// default counts toward satisfying `required`.
    pub fn apply_defaults(&self, doc: &mut serde_json::Map<String, Value>) {
        for (name, prop) in &self.properties {
            if let Some(default) = &prop.default {
                if !doc.contains_key(name) {
                    doc.insert(name.clone(), default.clone());
                }
            }
        }
    }

    /// Check declared properties against a candidate document: missing
    /// required fields and type mismatches both become validation errors.
    /// Undeclared properties are accepted without checking (spec §3).
    pub fn type_check(&self, doc: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        for (name, prop) in &self.properties {
            match doc.get(name) {
                Some(value) if !prop.kind.matches(value) => {
                    errors.insert(name.clone(), format!("expected {:?}", prop.kind));
                }
                None if prop.required => {
                    errors.insert(name.clone(), "required".to_string());
                }
                _ => {}
            }
        }
        errors
    }
}

#[derive(Debug)]
pub enum DescriptorError {
    NotFound(String),
    Io(String),
    Malformed(String),
}

impl std::fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorError::NotFound(name) => write!(f, "unknown collection `{name}`"),
            DescriptorError::Io(msg) => write!(f, "descriptor I/O error: {msg}"),
            DescriptorError::Malformed(msg) => write!(f, "malformed descriptor: {msg}"),
        }
    }
}

impl std::error::Error for DescriptorError {}

/// In-memory cache of collection descriptors, backed by one YAML file per
/// collection under `<collections_dir>/<name>/descriptor.yaml`.
pub struct DescriptorStore {
    root: PathBuf,
    descriptors: DashMap<String, CollectionDescriptor>,
}

impl DescriptorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), descriptors: DashMap::new() }
    }

    /// Load every `descriptor.yaml` found under the collections root into
    /// the in-memory cache. Called once at startup.
    pub fn load_all(&self) -> Result<(), DescriptorError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let descriptor_path = entry.path().join("descriptor.yaml");
            if !descriptor_path.is_file() {
                continue;
            }
            let descriptor = read_descriptor(&descriptor_path)?;
            self.descriptors.insert(descriptor.name.clone(), descriptor);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<CollectionDescriptor> {
        self.descriptors.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn list(&self) -> Vec<CollectionDescriptor> {
        self.descriptors.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn put(&self, descriptor: CollectionDescriptor) -> Result<(), DescriptorError> {
        let dir = self.root.join(&descriptor.name);
        std::fs::create_dir_all(&dir).map_err(|e| DescriptorError::Io(e.to_string()))?;
        let yaml = serde_yaml::to_string(&descriptor).map_err(|e| DescriptorError::Malformed(e.to_string()))?;
        std::fs::write(dir.join("descriptor.yaml"), yaml).map_err(|e| DescriptorError::Io(e.to_string()))?;
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), DescriptorError> {
        self.descriptors.remove(name);
        let dir = self.root.join(name);
        if dir.is_dir() {
            std::fs::remove_dir_all(dir).map_err(|e| DescriptorError::Io(e.to_string()))?;
        }
        Ok(())
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), DescriptorError> {
        let mut descriptor =
            self.get(from).ok_or_else(|| DescriptorError::NotFound(from.to_string()))?;
        descriptor.name = to.to_string();
        self.remove(from)?;
        self.put(descriptor)
    }

    pub fn handlers_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection).join("handlers")
    }
}

fn read_descriptor(path: &Path) -> Result<CollectionDescriptor, DescriptorError> {
    let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::Io(e.to_string()))?;
    serde_yaml::from_str(&text).map_err(|e| DescriptorError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_field_missing_is_an_error() {
        let mut descriptor = CollectionDescriptor::new("todo");
        descriptor.properties.insert(
            "title".to_string(),
            PropertyDescriptor { kind: PropertyType::String, required: true, default: None, protected: false, hidden: false },
        );
        let doc = json!({}).as_object().unwrap().clone();
        let errors = descriptor.type_check(&doc);
        assert_eq!(errors.get("title"), Some(&"required".to_string()));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let mut descriptor = CollectionDescriptor::new("todo");
        descriptor.properties.insert(
            "priority".to_string(),
            PropertyDescriptor { kind: PropertyType::Number, required: false, default: None, protected: false, hidden: false },
        );
        let doc = json!({"priority": "high"}).as_object().unwrap().clone();
        let errors = descriptor.type_check(&doc);
        assert!(errors.contains_key("priority"));
    }

    #[test]
    fn undeclared_properties_are_ignored() {
        let descriptor = CollectionDescriptor::new("todo");
        let doc = json!({"anything": true}).as_object().unwrap().clone();
        assert!(descriptor.type_check(&doc).is_empty());
    }

    #[test]
    fn put_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(dir.path());
        store.put(CollectionDescriptor::new("todo")).unwrap();

        let reloaded = DescriptorStore::new(dir.path());
        reloaded.load_all().unwrap();
        assert!(reloaded.contains("todo"));
    }
}
