//! Versioned relation tuple storage
//!
//! Storage layer of the Lattice authorization engine:
//! - Relation tuples: `object#relation@subject`, with userset subjects for
//!   nested membership
//! - Consistency tokens: every write earns one, every read pins one
//! - Write coordinator: contiguous applied watermark with async waiters
//! - Backends: in-memory (reference) and PostgreSQL (persistent history)

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod token;
pub mod tuple;

pub use coordinator::*;
pub use error::*;
pub use memory::*;
pub use postgres::*;
pub use store::*;
pub use token::*;
pub use tuple::*;
