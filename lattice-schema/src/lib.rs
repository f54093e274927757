//! Namespace schemas for the Lattice authorization engine
//!
//! Declares what exists (namespaces, stored relations) and what derives
//! from it (permissions over rewrite expressions), compiles declarations
//! into an evaluator-ready form, and versions them through a registry:
//! - Definitions: serde documents, buildable in code or decoded from JSON
//! - Compiler: duplicate/reference/type checks and static cycle rejection
//! - Registry: immutable `Arc`-shared revisions, active pointer semantics

pub mod compile;
pub mod definition;
pub mod error;
pub mod registry;

pub use compile::*;
pub use definition::*;
pub use error::*;
pub use registry::*;
