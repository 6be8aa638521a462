//! Node Table
//!
//! The computation graph itself (edges, recomputation, scheduling) belongs to
//! the engine. What lives here is the engine-facing surface of the
//! notification layer: a table of dispatchers keyed by node identity.
//!
//! # Design Decisions
//!
//! 1. Every node gets its own [`Dispatcher`](crate::notify::Dispatcher) and
//!    therefore its own timestamp sequence and its own publish lock. Nodes
//!    never contend with each other.
//!
//! 2. The table is a concurrent map. Lookups clone the dispatcher's `Arc` and
//!    release the map shard before any listener runs, so listeners are free
//!    to add or remove nodes.

mod hub;
mod node;

pub use hub::EventHub;
pub use node::NodeId;
