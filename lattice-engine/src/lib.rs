//! Relationship-based authorization engine for Lattice
//!
//! Implements Zanzibar-style access control over the lattice-store tuple
//! backends and the lattice-schema registry:
//! - Relation tuples with userset subjects for nested membership
//! - Permission expressions: union, intersection, exclusion, computed
//!   usersets and tuple-to-userset traversal
//! - Snapshot-pinned checks and expansion trees with consistency tokens
//! - Concurrent branch evaluation with decisive-answer short-circuiting
//!
//! # Core Concepts
//!
//! - **Object**: a namespaced resource, written `Workspace:w1`
//! - **Subject**: an object or a userset such as `Workspace:w1#owners`
//! - **Relation**: stored membership, declared per namespace
//! - **Permission**: a named expression over relations, never stored
//! - **Token**: the snapshot a write created and a read pins
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lattice_engine::{
//!     CheckRequest, LatticeEngine, MemoryTupleStore, NamespaceDef, ObjectRef, RelationDef,
//!     RelationTuple, SchemaDef, SchemaRegistry, SubjectRef,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = LatticeEngine::new(
//!         Arc::new(MemoryTupleStore::new()),
//!         Arc::new(SchemaRegistry::new()),
//!     );
//!     engine.publish_schema(
//!         &SchemaDef::new()
//!             .with_namespace(NamespaceDef::new("User"))
//!             .with_namespace(NamespaceDef::new("Doc").with_relation(RelationDef::new("viewers"))),
//!     )?;
//!
//!     let token = engine
//!         .write(RelationTuple::new(
//!             ObjectRef::new("Doc", "readme"),
//!             "viewers",
//!             SubjectRef::object("User", "alice"),
//!         ))
//!         .await?;
//!
//!     let decision = engine
//!         .check(
//!             CheckRequest::new(
//!                 ObjectRef::new("Doc", "readme"),
//!                 "viewers",
//!                 SubjectRef::object("User", "alice"),
//!             )
//!             .at(token),
//!         )
//!         .await?;
//!     assert!(decision.allowed);
//!     Ok(())
//! }
//! ```

mod check;
mod expand;

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use types::*;

// The schema and store surfaces a caller needs alongside the engine.
pub use lattice_schema::{
    CompiledSchema, NamespaceDef, PermissionDef, PermissionExpr, RelationDef, SchemaDef,
    SchemaError, SchemaRegistry, SchemaRevision,
};
pub use lattice_store::{
    ConsistencyToken, MemoryTupleStore, ObjectRef, Page, PostgresTupleStore, RelationTuple,
    StoreError, SubjectRef, TupleFilter, TupleStore, UsersetRef,
};
