//! Resource dependency graph
//!
//! The graph is the only thing the provisioning steps share: each step adds
//! its resources and hands back references that later steps embed in their
//! own configurations. Edges come from two places:
//!
//! - implicit: every `${...}` reference in a configuration
//! - explicit: [`Resource::depends_on`], for orderings that carry no data
//!   (e.g. "the distribution waits for certificate validation")

use crate::error::{CloudError, Result};
use crate::reference::{self, Address, Reference};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A declared resource (or data source) in the graph
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub address: Address,

    /// Provider-facing configuration, may contain reference tokens
    pub config: serde_json::Value,

    /// Explicit ordering edges
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<Address>,

    /// Data sources are read on every apply and never created
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub data_source: bool,
}

impl Resource {
    pub fn new(address: Address, config: serde_json::Value) -> Self {
        Self {
            address,
            config,
            depends_on: BTreeSet::new(),
            data_source: false,
        }
    }

    pub fn data(address: Address, config: serde_json::Value) -> Self {
        Self {
            data_source: true,
            ..Self::new(address, config)
        }
    }

    pub fn depends_on(mut self, address: &Address) -> Self {
        self.depends_on.insert(address.clone());
        self
    }

    /// Explicit and implicit dependencies of this resource
    pub fn dependencies(&self) -> Result<BTreeSet<Address>> {
        let mut deps = self.depends_on.clone();
        for r in reference::references(&self.config)? {
            deps.insert(r.address);
        }
        Ok(deps)
    }
}

/// Dependency graph of declared resources plus named outputs
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: BTreeMap<Address, Resource>,
    outputs: BTreeMap<String, Reference>,
    /// Not declared this run, but never treated as orphaned
    retained: BTreeSet<Address>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, rejecting duplicate addresses
    pub fn add(&mut self, resource: Resource) -> Result<Address> {
        let address = resource.address.clone();
        if self.resources.contains_key(&address) {
            return Err(CloudError::Graph(format!(
                "duplicate resource address {}",
                address
            )));
        }
        tracing::debug!("Declared {}", address);
        self.resources.insert(address.clone(), resource);
        Ok(address)
    }

    pub fn add_output(&mut self, name: impl Into<String>, value: Reference) {
        self.outputs.insert(name.into(), value);
    }

    /// Keep whatever state holds for `address` without managing it
    ///
    /// Used for resources whose inputs were unavailable this run (an asset
    /// that could not be read): they must not show up as deletions.
    pub fn retain(&mut self, address: Address) {
        tracing::debug!("Retaining {}", address);
        self.retained.insert(address);
    }

    /// A retained address also covers names nested beneath it (`img` covers
    /// `img/logo.png`)
    pub fn is_retained(&self, address: &Address) -> bool {
        if self.resources.contains_key(address) {
            return false;
        }
        self.retained.iter().any(|kept| {
            kept.resource_type() == address.resource_type()
                && address
                    .name()
                    .strip_prefix(kept.name())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    pub fn get(&self, address: &Address) -> Option<&Resource> {
        self.resources.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn outputs(&self) -> &BTreeMap<String, Reference> {
        &self.outputs
    }

    /// Resources of one type
    pub fn by_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .values()
            .filter(move |r| r.address.resource_type() == resource_type)
    }

    /// All `(dependent, dependency)` edges
    pub fn edges(&self) -> Result<Vec<(Address, Address)>> {
        let mut edges = Vec::new();
        for resource in self.resources.values() {
            for dep in resource.dependencies()? {
                edges.push((resource.address.clone(), dep));
            }
        }
        Ok(edges)
    }

    /// Whether `from` directly depends on `to`
    pub fn has_edge(&self, from: &Address, to: &Address) -> bool {
        self.resources
            .get(from)
            .and_then(|r| r.dependencies().ok())
            .is_some_and(|deps| deps.contains(to))
    }

    /// Whether `from` depends on `to` through any path
    pub fn depends_transitively(&self, from: &Address, to: &Address) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(resource) = self.resources.get(&current) else {
                continue;
            };
            let Ok(deps) = resource.dependencies() else {
                continue;
            };
            if deps.contains(to) {
                return true;
            }
            stack.extend(deps);
        }
        false
    }

    /// Check that every edge and output points at a declared resource
    pub fn validate(&self) -> Result<()> {
        for (from, to) in self.edges()? {
            if !self.resources.contains_key(&to) {
                return Err(CloudError::Graph(format!(
                    "{} depends on undeclared resource {}",
                    from, to
                )));
            }
        }
        for (name, value) in &self.outputs {
            if !self.resources.contains_key(&value.address) {
                return Err(CloudError::Graph(format!(
                    "output {} references undeclared resource {}",
                    name, value.address
                )));
            }
        }
        self.layers().map(|_| ())
    }

    /// Group resources into layers: every resource only depends on
    /// resources in earlier layers, so one layer may be applied in parallel.
    pub fn layers(&self) -> Result<Vec<Vec<Address>>> {
        let mut remaining: BTreeMap<&Address, BTreeSet<Address>> = BTreeMap::new();
        for (address, resource) in &self.resources {
            let deps = resource
                .dependencies()?
                .into_iter()
                .filter(|d| self.resources.contains_key(d))
                .collect();
            remaining.insert(address, deps);
        }

        let mut layers = Vec::new();
        while !remaining.is_empty() {
            let ready: Vec<Address> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(a, _)| (*a).clone())
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> = remaining.keys().map(|a| a.to_string()).collect();
                return Err(CloudError::Graph(format!(
                    "dependency cycle among: {}",
                    stuck.join(", ")
                )));
            }

            for address in &ready {
                remaining.remove(address);
            }
            for deps in remaining.values_mut() {
                for address in &ready {
                    deps.remove(address);
                }
            }
            layers.push(ready);
        }

        Ok(layers)
    }

    /// Deterministic topological order
    pub fn topological_order(&self) -> Result<Vec<Address>> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }

    /// JSON rendering of resources and outputs for the execution engine
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut resources = serde_json::Map::new();
        let mut data = serde_json::Map::new();

        for resource in self.resources.values() {
            let mut body = match &resource.config {
                serde_json::Value::Object(map) => map.clone(),
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), other.clone());
                    map
                }
            };
            if !resource.depends_on.is_empty() {
                body.insert(
                    "depends_on".to_string(),
                    serde_json::to_value(&resource.depends_on)?,
                );
            }

            let section = if resource.data_source {
                &mut data
            } else {
                &mut resources
            };
            let by_type = section
                .entry(resource.address.resource_type().to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if let serde_json::Value::Object(map) = by_type {
                map.insert(
                    resource.address.name().to_string(),
                    serde_json::Value::Object(body),
                );
            }
        }

        let outputs: serde_json::Map<String, serde_json::Value> = self
            .outputs
            .iter()
            .map(|(name, r)| (name.clone(), serde_json::json!({ "value": r.token() })))
            .collect();

        Ok(serde_json::json!({
            "resource": resources,
            "data": data,
            "output": outputs,
        }))
    }
}
