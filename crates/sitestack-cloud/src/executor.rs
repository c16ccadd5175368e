//! Plan and apply a resource graph against a [`ResourceDriver`]
//!
//! The graph is applied layer by layer. Nodes inside one layer have no
//! edges between them and run concurrently (bounded). State is written
//! after every layer, so a failed run keeps whatever it already created and
//! the next run picks up from there.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::graph::{Resource, ResourceGraph};
use crate::provider::{ResolvedResource, ResourceDriver, RetryConfig};
use crate::reference::{self, Address, Reference};
use crate::state::{GlobalState, ResourceState, ResourceStatus, StateManager, config_hash};
use futures_util::stream::{self, StreamExt};

/// Resolve every reference in a resource's configuration against state
fn resolve_against(resource: &Resource, state: &GlobalState) -> Result<ResolvedResource> {
    let lookup = |r: &Reference| state.attribute(&r.address, &r.attribute);
    Ok(ResolvedResource {
        address: resource.address.clone(),
        config: reference::resolve(&resource.config, &lookup)?,
    })
}

/// Compute the actions needed to move `state` to the declared graph
pub fn plan(graph: &ResourceGraph, state: &GlobalState) -> Result<Plan> {
    graph.validate()?;

    let mut actions = Vec::new();
    for address in graph.topological_order()? {
        let Some(resource) = graph.get(&address) else {
            continue;
        };
        let resource_type = address.resource_type().to_string();
        let id = address.to_string();

        if resource.data_source {
            actions.push(Action::new(
                ActionType::Read,
                resource_type,
                id.clone(),
                format!("read {}", id),
            ));
            continue;
        }

        let action = match state.get(&address) {
            None => Action::new(
                ActionType::Create,
                resource_type,
                id.clone(),
                format!("create {}", id),
            ),
            Some(current) => match resolve_against(resource, state) {
                Ok(resolved) => {
                    let hash = config_hash(&resolved.config);
                    if current.config_hash.as_deref() == Some(hash.as_str())
                        && current.status == ResourceStatus::Ready
                    {
                        Action::new(
                            ActionType::NoOp,
                            resource_type,
                            id.clone(),
                            format!("{} is up to date", id),
                        )
                    } else {
                        Action::new(
                            ActionType::Update,
                            resource_type,
                            id.clone(),
                            format!("update {}", id),
                        )
                    }
                }
                Err(_) => Action::new(
                    ActionType::Update,
                    resource_type,
                    id.clone(),
                    format!("update {} (inputs known after apply)", id),
                ),
            },
        };
        actions.push(action);
    }

    let mut orphans: Vec<(&String, &ResourceState)> = state
        .resources
        .iter()
        .filter(|(key, _)| {
            key.parse::<Address>()
                .map(|a| !graph.contains(&a))
                .unwrap_or(true)
        })
        .collect();
    orphans.sort_by(|a, b| a.0.cmp(b.0));
    for (key, current) in orphans {
        let retained = key.parse::<Address>().is_ok_and(|a| graph.is_retained(&a));
        if retained {
            actions.push(Action::new(
                ActionType::NoOp,
                current.resource_type.clone(),
                key.clone(),
                format!("keep {} (inputs unavailable this run)", key),
            ));
            continue;
        }
        actions.push(
            Action::new(
                ActionType::Delete,
                current.resource_type.clone(),
                key.clone(),
                format!("delete {} (no longer declared)", key),
            )
            .with_detail("id", serde_json::json!(current.id)),
        );
    }

    Ok(Plan::new(actions))
}

/// Options for [`Executor`]
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Delete resources recorded in state that are no longer declared
    pub prune: bool,

    /// Maximum number of nodes applied at once inside one layer
    pub concurrency: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            prune: false,
            concurrency: 8,
        }
    }
}

enum NodeOutcome {
    Created(ResourceState),
    Updated(ResourceState),
    Read(ResourceState),
    Unchanged,
}

/// Reference executor for a [`ResourceGraph`]
pub struct Executor<'a> {
    driver: &'a dyn ResourceDriver,
    retry: RetryConfig,
    options: ApplyOptions,
}

impl<'a> Executor<'a> {
    pub fn new(driver: &'a dyn ResourceDriver) -> Self {
        Self {
            driver,
            retry: RetryConfig::default(),
            options: ApplyOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply against state persisted by `manager`, holding its lock
    pub async fn apply_persisted(
        &self,
        graph: &ResourceGraph,
        manager: &StateManager,
    ) -> Result<ApplyResult> {
        let lock = manager.acquire_lock().await?;
        let mut state = manager.load().await?;
        let result = self.run(graph, &mut state, Some(manager)).await;
        lock.release().await?;
        result
    }

    /// Apply against in-memory state
    pub async fn apply(
        &self,
        graph: &ResourceGraph,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        self.run(graph, state, None).await
    }

    async fn run(
        &self,
        graph: &ResourceGraph,
        state: &mut GlobalState,
        manager: Option<&StateManager>,
    ) -> Result<ApplyResult> {
        let start = std::time::Instant::now();
        let plan = plan(graph, state)?;
        let mut result = ApplyResult::new();

        tracing::info!("Applying {} resources: {}", graph.len(), plan.summary());

        for (index, layer) in graph.layers()?.into_iter().enumerate() {
            tracing::debug!("Layer {}: {} resources", index, layer.len());

            let outcomes: Vec<(Address, Result<NodeOutcome>)> = {
                let current: &GlobalState = state;
                stream::iter(layer)
                    .map(|address| async move {
                        let outcome = match graph.get(&address) {
                            Some(resource) => self.apply_node(resource, current).await,
                            None => Err(CloudError::Graph(format!("unknown resource {}", address))),
                        };
                        (address, outcome)
                    })
                    .buffer_unordered(self.options.concurrency.max(1))
                    .collect()
                    .await
            };

            let mut first_error = None;
            for (address, outcome) in outcomes {
                let key = address.to_string();
                match outcome {
                    Ok(NodeOutcome::Created(new_state)) => {
                        tracing::info!("Created {} ({})", key, new_state.id);
                        result.add_success(
                            format!("{}-{}", ActionType::Create, key),
                            new_state.id.clone(),
                        );
                        state.set_resource(key, new_state);
                    }
                    Ok(NodeOutcome::Updated(new_state)) => {
                        tracing::info!("Updated {} ({})", key, new_state.id);
                        result.add_success(
                            format!("{}-{}", ActionType::Update, key),
                            new_state.id.clone(),
                        );
                        state.set_resource(key, new_state);
                    }
                    Ok(NodeOutcome::Read(new_state)) => {
                        result.add_success(
                            format!("{}-{}", ActionType::Read, key),
                            new_state.id.clone(),
                        );
                        state.set_resource(key, new_state);
                    }
                    Ok(NodeOutcome::Unchanged) => {
                        tracing::debug!("{} is up to date", key);
                        result.add_success(format!("{}-{}", ActionType::NoOp, key), String::new());
                    }
                    Err(e) if !e.is_fatal() => {
                        tracing::warn!("Skipped {}: {}", key, e);
                        result.add_failure(key, e.to_string());
                    }
                    Err(e) => {
                        tracing::error!("Failed to apply {}: {}", key, e);
                        result.add_failure(key, e.to_string());
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if let Some(manager) = manager {
                manager.save(state).await?;
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        for action in plan.actions_by_type(ActionType::Delete) {
            self.remove_orphan(action, state, &mut result).await?;
        }

        for (name, value) in graph.outputs() {
            let resolved = state.attribute(&value.address, &value.attribute).ok_or_else(|| {
                CloudError::Graph(format!("output {} is unresolved ({})", name, value))
            })?;
            state.outputs.insert(name.clone(), resolved.clone());
            result.outputs.insert(name.clone(), resolved);
        }

        if let Some(manager) = manager {
            manager.save(state).await?;
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn apply_node(&self, resource: &Resource, state: &GlobalState) -> Result<NodeOutcome> {
        let resolved = resolve_against(resource, state)?;
        let hash = config_hash(&resolved.config);
        let what = resource.address.to_string();

        if resource.data_source {
            let attributes = self.retry.retry(&what, || self.driver.read(&resolved)).await?;
            let id = attributes
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or(&what)
                .to_string();
            return Ok(NodeOutcome::Read(
                ResourceState::new(id, resource.address.resource_type())
                    .with_status(ResourceStatus::Ready)
                    .with_attributes(attributes)
                    .with_config_hash(hash),
            ));
        }

        match state.get(&resource.address) {
            None => {
                let created = self.retry.retry(&what, || self.driver.create(&resolved)).await?;
                Ok(NodeOutcome::Created(finish(created, hash)))
            }
            Some(current)
                if current.config_hash.as_deref() == Some(hash.as_str())
                    && current.status == ResourceStatus::Ready =>
            {
                Ok(NodeOutcome::Unchanged)
            }
            Some(current) => {
                let updated = self
                    .retry
                    .retry(&what, || self.driver.update(&resolved, current))
                    .await?;
                Ok(NodeOutcome::Updated(finish(updated, hash)))
            }
        }
    }

    async fn remove_orphan(
        &self,
        action: &Action,
        state: &mut GlobalState,
        result: &mut ApplyResult,
    ) -> Result<()> {
        if !self.options.prune {
            tracing::warn!(
                "{} is no longer declared; keeping it (enable pruning to delete)",
                action.resource_id
            );
            result.add_skipped(action.id.clone(), action.description.clone());
            return Ok(());
        }

        let Some(current) = state.get_resource(&action.resource_id).cloned() else {
            return Ok(());
        };
        let address: Address = action.resource_id.parse()?;
        self.retry
            .retry(&action.resource_id, || self.driver.delete(&address, &current))
            .await?;
        tracing::info!("Deleted {}", action.resource_id);
        state.remove_resource(&action.resource_id);
        result.add_success(action.id.clone(), format!("deleted {}", current.id));
        Ok(())
    }
}

fn finish(mut applied: ResourceState, hash: String) -> ResourceState {
    applied.status = ResourceStatus::Ready;
    applied.config_hash = Some(hash);
    if !applied.attributes.contains_key("id") {
        applied
            .attributes
            .insert("id".to_string(), serde_json::json!(applied.id));
    }
    applied
}
