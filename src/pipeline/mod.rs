pub mod runner;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;

use crate::tasks::TaskSpec;

/// One ordered provisioning pipeline, loaded from a YAML document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    pub name: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Pipeline {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse pipeline document")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&text)
    }
}

/// Run-scoped property map. Tasks publish identifiers here so later tasks
/// can omit the matching parameter.
///
/// A well-known key published twice becomes ambiguous: it stops being served
/// as a fallback, since there is no way to tell which resource was meant.
/// Explicitly-named properties (`property_name_for_*`) are plain writes.
#[derive(Debug, Default)]
pub struct PipelineContext {
    values: HashMap<String, String>,
    ambiguous: HashSet<String>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, key: &str, value: &str) {
        if self.ambiguous.contains(key) {
            return;
        }
        if self.values.contains_key(key) {
            info!("property '{}' was set twice and is no longer usable as a fallback", key);
            self.values.remove(key);
            self.ambiguous.insert(key.to_string());
            return;
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Fallback lookup; ambiguous keys yield nothing.
    pub fn shared(&self, key: &str) -> Option<&str> {
        if self.ambiguous.contains(key) {
            return None;
        }
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Sets the property only if it is not already present.
    pub fn set_new(&mut self, key: &str, value: &str) {
        self.values
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Appends to a comma-separated list property.
    pub fn append(&mut self, key: &str, value: &str) {
        match self.values.get_mut(key) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => {
                self.values.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_key_round_trip() {
        let mut cx = PipelineContext::new();
        cx.publish("stackId", "stack-1");
        assert_eq!(cx.shared("stackId"), Some("stack-1"));
    }

    #[test]
    fn double_publish_makes_key_ambiguous() {
        let mut cx = PipelineContext::new();
        cx.publish("stackId", "stack-1");
        cx.publish("stackId", "stack-2");
        assert_eq!(cx.shared("stackId"), None);
        // Further publishes do not resurrect the key.
        cx.publish("stackId", "stack-3");
        assert_eq!(cx.shared("stackId"), None);
    }

    #[test]
    fn set_new_does_not_overwrite() {
        let mut cx = PipelineContext::new();
        cx.set("out", "first");
        cx.set_new("out", "second");
        assert_eq!(cx.get("out"), Some("first"));
    }

    #[test]
    fn append_builds_comma_list() {
        let mut cx = PipelineContext::new();
        cx.append("deploymentIds", "d-1");
        cx.append("deploymentIds", "d-2");
        assert_eq!(cx.get("deploymentIds"), Some("d-1,d-2"));
    }
}
