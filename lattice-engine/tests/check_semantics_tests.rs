//! Check evaluation semantics over the in-memory store: combinator
//! behavior, nested usersets, validation errors and evaluation bounds.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use lattice_engine::{
    CheckDecision, CheckRequest, ConsistencyToken, EngineConfig, EngineError, LatticeEngine,
    MemoryTupleStore, NamespaceDef, ObjectRef, PermissionExpr, RelationDef, RelationTuple,
    SchemaDef, SchemaRegistry, SubjectRef,
};
use std::sync::Arc;
use std::time::Duration;

/// Documents with direct relations, a union, an intersection and an
/// exclusion, plus teams for nested and cyclic membership data.
fn doc_schema() -> SchemaDef {
    SchemaDef::new()
        .with_namespace(NamespaceDef::new("User"))
        .with_namespace(
            NamespaceDef::new("Team")
                .with_relation(RelationDef::new("members").with_subject_types(&["User", "Team"])),
        )
        .with_namespace(
            NamespaceDef::new("Doc")
                .with_relation(RelationDef::new("owners").with_subject_types(&["User", "Team"]))
                .with_relation(RelationDef::new("viewers").with_subject_types(&["User", "Team"]))
                .with_relation(RelationDef::new("banned").with_subject_types(&["User"]))
                .with_permission(
                    "view",
                    PermissionExpr::union(vec![
                        PermissionExpr::computed("viewers"),
                        PermissionExpr::computed("owners"),
                    ]),
                )
                .with_permission("edit", PermissionExpr::computed("owners"))
                .with_permission(
                    "review",
                    PermissionExpr::intersection(vec![
                        PermissionExpr::computed("viewers"),
                        PermissionExpr::computed("owners"),
                    ]),
                )
                .with_permission(
                    "read",
                    PermissionExpr::exclusion(
                        PermissionExpr::computed("view"),
                        PermissionExpr::computed("banned"),
                    ),
                ),
        )
}

fn engine_with_config(config: EngineConfig) -> LatticeEngine {
    let engine = LatticeEngine::with_config(
        Arc::new(MemoryTupleStore::new()),
        Arc::new(SchemaRegistry::new()),
        config,
    );
    engine.publish_schema(&doc_schema()).expect("fixture schema should compile");
    engine
}

fn engine() -> LatticeEngine {
    engine_with_config(EngineConfig::default())
}

async fn grant(engine: &LatticeEngine, text: &str) -> ConsistencyToken {
    let tuple: RelationTuple = text.parse().expect("tuple notation");
    engine.write(tuple).await.expect("write should succeed")
}

async fn revoke(engine: &LatticeEngine, text: &str) -> ConsistencyToken {
    let tuple: RelationTuple = text.parse().expect("tuple notation");
    engine.delete(tuple).await.expect("delete should succeed")
}

async fn decide(
    engine: &LatticeEngine,
    object: &str,
    permission: &str,
    subject: &str,
) -> Result<CheckDecision, EngineError> {
    let object: ObjectRef = object.parse().expect("object notation");
    let subject: SubjectRef = subject.parse().expect("subject notation");
    engine.check(CheckRequest::new(object, permission, subject)).await
}

async fn allowed(engine: &LatticeEngine, object: &str, permission: &str, subject: &str) -> bool {
    decide(engine, object, permission, subject)
        .await
        .expect("check should succeed")
        .allowed
}

#[tokio::test]
async fn test_direct_tuple_grants_relation() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;

    assert!(allowed(&engine, "Doc:d1", "viewers", "User:alice").await);
    assert!(!allowed(&engine, "Doc:d1", "viewers", "User:bob").await, "no path means denied");
    assert!(!allowed(&engine, "Doc:d2", "viewers", "User:alice").await, "grants are per object");
}

#[tokio::test]
async fn test_union_grants_through_either_branch() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;
    grant(&engine, "Doc:d1#owners@User:bob").await;

    assert!(allowed(&engine, "Doc:d1", "view", "User:alice").await);
    assert!(allowed(&engine, "Doc:d1", "view", "User:bob").await);
    assert!(!allowed(&engine, "Doc:d1", "view", "User:carol").await);
}

#[tokio::test]
async fn test_union_survives_losing_one_branch() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;
    grant(&engine, "Doc:d1#owners@User:alice").await;
    assert!(allowed(&engine, "Doc:d1", "view", "User:alice").await);

    revoke(&engine, "Doc:d1#viewers@User:alice").await;
    assert!(
        allowed(&engine, "Doc:d1", "view", "User:alice").await,
        "the owners branch still grants view"
    );

    revoke(&engine, "Doc:d1#owners@User:alice").await;
    assert!(!allowed(&engine, "Doc:d1", "view", "User:alice").await);
}

#[tokio::test]
async fn test_intersection_requires_every_branch() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;
    grant(&engine, "Doc:d1#owners@User:alice").await;
    grant(&engine, "Doc:d1#owners@User:bob").await;
    grant(&engine, "Doc:d1#viewers@User:carol").await;

    assert!(allowed(&engine, "Doc:d1", "review", "User:alice").await);
    assert!(!allowed(&engine, "Doc:d1", "review", "User:bob").await, "owner but not viewer");
    assert!(!allowed(&engine, "Doc:d1", "review", "User:carol").await, "viewer but not owner");
}

#[tokio::test]
async fn test_exclusion_subtracts_banned_subjects() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;
    grant(&engine, "Doc:d1#viewers@User:mallory").await;
    grant(&engine, "Doc:d1#banned@User:mallory").await;

    assert!(allowed(&engine, "Doc:d1", "read", "User:alice").await);
    assert!(!allowed(&engine, "Doc:d1", "read", "User:mallory").await);
    assert!(
        allowed(&engine, "Doc:d1", "view", "User:mallory").await,
        "the ban only affects permissions that subtract it"
    );
}

#[tokio::test]
async fn test_nested_userset_membership_resolves_transitively() {
    let engine = engine();
    grant(&engine, "Team:eng#members@User:alice").await;
    grant(&engine, "Team:core#members@User:dana").await;
    grant(&engine, "Team:eng#members@Team:core#members").await;
    grant(&engine, "Doc:d1#viewers@Team:eng#members").await;

    assert!(allowed(&engine, "Doc:d1", "view", "User:alice").await, "one userset hop");
    assert!(allowed(&engine, "Doc:d1", "view", "User:dana").await, "two userset hops");
    assert!(!allowed(&engine, "Doc:d1", "view", "User:erin").await);
}

#[tokio::test]
async fn test_userset_subject_checks_match_direct_tuples() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@Team:eng#members").await;

    assert!(
        allowed(&engine, "Doc:d1", "viewers", "Team:eng#members").await,
        "a userset subject matches its own stored tuple"
    );
    assert!(!allowed(&engine, "Doc:d1", "viewers", "Team:ops#members").await);
}

#[tokio::test]
async fn test_duplicate_writes_collapse_to_one_grant() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;
    grant(&engine, "Doc:d1#viewers@User:alice").await;

    revoke(&engine, "Doc:d1#viewers@User:alice").await;
    assert!(
        !allowed(&engine, "Doc:d1", "viewers", "User:alice").await,
        "one delete must revoke a grant no matter how often it was written"
    );
}

#[tokio::test]
async fn test_unknown_namespace_is_rejected() {
    let engine = engine();
    let error = decide(&engine, "Ghost:g1", "view", "User:alice").await.unwrap_err();
    match error {
        EngineError::UnknownNamespace(namespace) => assert_eq!(namespace, "Ghost"),
        other => panic!("expected UnknownNamespace, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_permission_is_rejected() {
    let engine = engine();
    let error = decide(&engine, "Doc:d1", "destroy", "User:alice").await.unwrap_err();
    match error {
        EngineError::UnknownPermission { namespace, name } => {
            assert_eq!(namespace, "Doc");
            assert_eq!(name, "destroy");
        }
        other => panic!("expected UnknownPermission, got {other:?}"),
    }
    assert_eq!(
        decide(&engine, "Doc:d1", "destroy", "User:alice").await.unwrap_err().code(),
        "ENGINE_UNKNOWN_PERMISSION"
    );
}

#[tokio::test]
async fn test_subject_outside_schema_is_rejected() {
    let engine = engine();
    assert!(matches!(
        decide(&engine, "Doc:d1", "view", "Ghost:g1").await,
        Err(EngineError::SubjectInvalid(_))
    ));
    assert!(
        matches!(
            decide(&engine, "Doc:d1", "view", "Team:eng#chairs").await,
            Err(EngineError::SubjectInvalid(_))
        ),
        "userset subjects must name a declared relation or permission"
    );
}

#[tokio::test]
async fn test_operations_require_a_published_schema() {
    let engine = LatticeEngine::new(
        Arc::new(MemoryTupleStore::new()),
        Arc::new(SchemaRegistry::new()),
    );
    assert!(matches!(
        decide(&engine, "Doc:d1", "view", "User:alice").await,
        Err(EngineError::NoActiveSchema)
    ));
    let tuple: RelationTuple = "Doc:d1#viewers@User:alice".parse().unwrap();
    assert!(matches!(engine.write(tuple).await, Err(EngineError::NoActiveSchema)));
}

#[tokio::test]
async fn test_write_validation_rejects_undeclared_names() {
    let engine = engine();

    let undeclared_relation: RelationTuple = "Doc:d1#likes@User:alice".parse().unwrap();
    assert!(matches!(
        engine.write(undeclared_relation).await,
        Err(EngineError::InvalidTuple(_))
    ));

    let undeclared_namespace: RelationTuple = "Ghost:g1#viewers@User:alice".parse().unwrap();
    assert!(matches!(
        engine.write(undeclared_namespace).await,
        Err(EngineError::InvalidTuple(_))
    ));

    let subject_type_violation: RelationTuple = "Doc:d1#banned@Team:eng".parse().unwrap();
    assert!(
        matches!(engine.write(subject_type_violation).await, Err(EngineError::InvalidTuple(_))),
        "banned only accepts User subjects"
    );

    let undeclared_subject_userset: RelationTuple =
        "Doc:d1#viewers@Team:eng#chairs".parse().unwrap();
    assert!(matches!(
        engine.write(undeclared_subject_userset).await,
        Err(EngineError::InvalidTuple(_))
    ));
}

#[tokio::test]
async fn test_write_rejects_separators_inside_components() {
    let engine = engine();

    let at_in_id = RelationTuple::new(
        ObjectRef::new("Doc", "a@b"),
        "viewers",
        SubjectRef::object("User", "alice"),
    );
    assert!(
        matches!(engine.write(at_in_id).await, Err(EngineError::InvalidTuple(_))),
        "an object id holding a separator would not round-trip through page tokens"
    );

    let colon_in_id = RelationTuple::new(
        ObjectRef::new("Doc", "d:1"),
        "viewers",
        SubjectRef::object("User", "alice"),
    );
    assert!(matches!(engine.write(colon_in_id).await, Err(EngineError::InvalidTuple(_))));

    let hash_in_subject = RelationTuple::new(
        ObjectRef::new("Doc", "d1"),
        "viewers",
        SubjectRef::object("User", "a#b"),
    );
    assert!(matches!(engine.write(hash_in_subject).await, Err(EngineError::InvalidTuple(_))));

    let separator_delete = RelationTuple::new(
        ObjectRef::new("Doc", "a@b"),
        "viewers",
        SubjectRef::object("User", "alice"),
    );
    assert!(
        matches!(engine.delete(separator_delete).await, Err(EngineError::InvalidTuple(_))),
        "shape validation covers deletes as well"
    );
}

#[tokio::test]
async fn test_apply_validates_writes_before_touching_the_store() {
    let engine = engine();
    let good: RelationTuple = "Doc:d1#viewers@User:alice".parse().unwrap();
    let bad: RelationTuple = "Doc:d1#likes@User:alice".parse().unwrap();

    assert!(matches!(
        engine.apply(vec![good, bad], Vec::new()).await,
        Err(EngineError::InvalidTuple(_))
    ));
    assert!(
        !allowed(&engine, "Doc:d1", "viewers", "User:alice").await,
        "a rejected batch must not leave partial writes behind"
    );
}

#[tokio::test]
async fn test_delete_skips_schema_validation() {
    let engine = engine();
    // A relation the active schema never declared; revoking it must
    // still work so schema changes cannot trap stale tuples.
    let stale: RelationTuple = "Doc:d1#likes@User:alice".parse().unwrap();
    let token = engine.delete(stale).await.expect("delete should succeed");
    assert!(token > ConsistencyToken::ZERO);
}

#[tokio::test]
async fn test_cyclic_membership_fails_closed_for_absent_subjects() {
    let engine = engine();
    grant(&engine, "Team:a#members@Team:b#members").await;
    grant(&engine, "Team:b#members@Team:a#members").await;

    let error = decide(&engine, "Team:a", "members", "User:zoe").await.unwrap_err();
    assert!(
        matches!(error, EngineError::DepthExceeded { .. }),
        "a cycle with no answer must error, not hang or deny silently: {error:?}"
    );
}

#[tokio::test]
async fn test_cyclic_membership_still_finds_real_members() {
    let engine = engine();
    grant(&engine, "Team:a#members@Team:b#members").await;
    grant(&engine, "Team:b#members@Team:a#members").await;
    grant(&engine, "Team:b#members@User:yan").await;

    assert!(
        allowed(&engine, "Team:a", "members", "User:yan").await,
        "a decisive true on one branch outweighs the cyclic branch"
    );
}

#[tokio::test]
async fn test_depth_budget_bounds_long_chains() {
    let engine = engine_with_config(EngineConfig::default().with_max_depth(4));
    for hop in 0..4 {
        grant(&engine, &format!("Team:t{}#members@Team:t{}#members", hop, hop + 1)).await;
    }
    grant(&engine, "Team:t4#members@User:alice").await;

    let error = decide(&engine, "Team:t0", "members", "User:alice").await.unwrap_err();
    match error {
        EngineError::DepthExceeded { limit } => assert_eq!(limit, 4),
        other => panic!("expected DepthExceeded, got {other:?}"),
    }

    let roomy = engine_with_config(EngineConfig::default().with_max_depth(8));
    for hop in 0..4 {
        grant(&roomy, &format!("Team:t{}#members@Team:t{}#members", hop, hop + 1)).await;
    }
    grant(&roomy, "Team:t4#members@User:alice").await;
    assert!(
        allowed(&roomy, "Team:t0", "members", "User:alice").await,
        "the same chain resolves under a wider budget"
    );
}

#[tokio::test]
async fn test_zero_eval_budget_cancels_the_check() {
    let engine = engine_with_config(EngineConfig::default().with_eval_timeout(Duration::ZERO));
    grant(&engine, "Doc:d1#viewers@User:alice").await;

    let error = decide(&engine, "Doc:d1", "view", "User:alice").await.unwrap_err();
    assert!(matches!(error, EngineError::Cancelled { .. }), "got {error:?}");
    assert_eq!(error.code(), "ENGINE_CANCELLED");
}

#[tokio::test]
async fn test_request_deadline_tightens_the_eval_budget() {
    let engine = engine();
    grant(&engine, "Doc:d1#viewers@User:alice").await;

    let object: ObjectRef = "Doc:d1".parse().unwrap();
    let subject: SubjectRef = "User:alice".parse().unwrap();
    let request = CheckRequest::new(object, "view", subject).with_timeout(Duration::ZERO);
    let error = engine.check(request).await.unwrap_err();
    assert!(
        matches!(error, EngineError::Cancelled { .. }),
        "a zero caller deadline must cancel even under the default engine budget, got {error:?}"
    );
}

#[tokio::test]
async fn test_decision_reports_the_snapshot_token() {
    let engine = engine();
    let token = grant(&engine, "Doc:d1#viewers@User:alice").await;

    let object: ObjectRef = "Doc:d1".parse().unwrap();
    let subject: SubjectRef = "User:alice".parse().unwrap();
    let pinned = engine
        .check(CheckRequest::new(object.clone(), "view", subject.clone()).at(token))
        .await
        .unwrap();
    assert_eq!(pinned.token, token);

    let latest = engine.check(CheckRequest::new(object, "view", subject)).await.unwrap();
    assert_eq!(latest.token, engine.store().head());
}
