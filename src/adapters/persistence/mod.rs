//! Persistence Adapters - Store Implementations
//!
//! Implements the `Store` port. The in-memory backend is the reference
//! implementation; it enforces the same versioning and compare-and-set
//! semantics a SQL backend would express with `WHERE` clauses.

pub mod memory;

pub use memory::MemoryStore;
