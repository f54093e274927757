//! End-to-end tour of the engine: publish a schema, write tuples, then
//! check, expand and list against pinned snapshots.
//!
//! Run with:
//!   cargo run -p lattice-engine --example workspace_demo
//! Set RUST_LOG=lattice_store=debug,lattice_engine=debug for the write
//! and evaluation logs.

use anyhow::Result;
use lattice_engine::{
    CheckRequest, ExpandRequest, LatticeEngine, ListRequest, MemoryTupleStore, NamespaceDef,
    ObjectRef, PermissionExpr, RelationDef, RelationTuple, SchemaDef, SchemaRegistry, SubjectRef,
    TupleFilter,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let engine = LatticeEngine::new(
        Arc::new(MemoryTupleStore::new()),
        Arc::new(SchemaRegistry::new()),
    );

    // Workspaces carry their own members; units inherit view and edit
    // from the owners of every workspace attached to them.
    let revision = engine.publish_schema(
        &SchemaDef::new()
            .with_namespace(NamespaceDef::new("User"))
            .with_namespace(
                NamespaceDef::new("Workspace")
                    .with_relation(RelationDef::new("users").with_subject_types(&["User"]))
                    .with_relation(RelationDef::new("owners").with_subject_types(&["User"]))
                    .with_permission(
                        "view",
                        PermissionExpr::union(vec![
                            PermissionExpr::computed("users"),
                            PermissionExpr::computed("owners"),
                        ]),
                    )
                    .with_permission("edit", PermissionExpr::computed("owners")),
            )
            .with_namespace(
                NamespaceDef::new("Unit")
                    .with_relation(
                        RelationDef::new("workspaces").with_subject_types(&["Workspace"]),
                    )
                    .with_relation(RelationDef::new("users").with_subject_types(&["User"]))
                    .with_permission(
                        "view",
                        PermissionExpr::union(vec![
                            PermissionExpr::traverse("workspaces", "owners"),
                            PermissionExpr::computed("users"),
                        ]),
                    )
                    .with_permission("edit", PermissionExpr::traverse("workspaces", "owners")),
            ),
    )?;
    println!("published schema revision v{}", revision.version);

    for text in [
        "Workspace:w1#owners@User:alice",
        "Workspace:w1#users@User:bob",
        "Unit:u1#workspaces@Workspace:w1",
        "Unit:u1#users@User:carol",
    ] {
        let tuple: RelationTuple = text.parse()?;
        let token = engine.write(tuple).await?;
        println!("wrote {text} at token {token}");
    }

    let unit = ObjectRef::new("Unit", "u1");
    for (subject, permission) in [
        ("User:alice", "view"),
        ("User:alice", "edit"),
        ("User:bob", "view"),
        ("User:carol", "view"),
        ("User:carol", "edit"),
    ] {
        let parsed: SubjectRef = subject.parse()?;
        let decision = engine
            .check(CheckRequest::new(unit.clone(), permission, parsed))
            .await?;
        println!(
            "check {subject} {permission} Unit:u1 -> {} (token {})",
            if decision.allowed { "allowed" } else { "denied" },
            decision.token
        );
    }

    let expansion = engine.expand(ExpandRequest::new(unit, "view")).await?;
    println!("expand Unit:u1#view at token {}:", expansion.token);
    println!("{}", serde_json::to_string_pretty(&expansion.root)?);

    let listing = engine
        .list_tuples(ListRequest::new(TupleFilter::by_object("Workspace", "w1")))
        .await?;
    println!("tuples on Workspace:w1 at token {}:", listing.token);
    for tuple in &listing.tuples {
        println!("  {tuple}");
    }

    Ok(())
}
