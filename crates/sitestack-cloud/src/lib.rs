//! sitestack cloud machinery
//!
//! This crate holds everything that is not specific to the website
//! topology: resource addresses and references, the dependency graph,
//! plans, persisted state, retry policy and the reference executor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 sitestack CLI                    │
//! │            (synth / plan / output)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               sitestack-website                  │
//! │  storage / certificate / distribution / dns      │
//! │  orchestrator → ResourceGraph                    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               sitestack-cloud                    │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    Graph     │  │  State Mgmt  │             │
//! │  └──────────────┘  └──────────────┘             │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Executor → trait ResourceDriver { .. }  │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod executor;
pub mod graph;
pub mod provider;
pub mod reference;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use executor::{ApplyOptions, Executor, plan};
pub use graph::{Resource, ResourceGraph};
pub use provider::{ResolvedResource, ResourceDriver, RetryConfig};
pub use reference::{Address, Attributes, Reference};
pub use state::{
    GlobalState, ResourceState, ResourceStatus, StateLock, StateManager, config_hash,
};
