//! Resource registry.
//!
//! Tracks named resources together with their disposer and last-touched
//! time, and evicts everything that outlived a ttl window.
//!
//! # Lifecycle
//!
//! ```text
//! absent --register--> registered --touch--> registered --dispose/sweep--> absent
//! ```
//!
//! An entry cannot be paused or revived; re-registering an id disposes the
//! previous entry before installing the new one.
//!
//! # Example
//!
//! ```rust,ignore
//! use reclaim::registry::{Disposer, ResourceRegistry};
//! use std::time::Duration;
//!
//! let registry = ResourceRegistry::new();
//! registry.register("img-1", Disposer::infallible(|| release_texture()))?;
//!
//! // Keep it alive
//! registry.touch("img-1");
//!
//! // Evict anything untouched for 30s, except the hero banner
//! let report = registry.sweep(Duration::from_secs(30), &["hero-banner"]);
//! println!("{}", report.summary());
//! ```

mod disposer;
mod resource_registry;
mod types;

pub use disposer::{Dispose, DisposeError, Disposer};
pub use resource_registry::ResourceRegistry;
pub use types::{DisposeFailure, DisposeOutcome, RegistryStats, ResourceId, SweepReport};
