//! Schema compiler
//!
//! Turns a definition document into the compiled form the evaluator reads:
//! every namespace becomes a map of usersets, where a stored relation
//! carries an implicit `This` expression and a permission carries its own.
//! Compilation rejects anything the evaluator could not answer soundly:
//! duplicate or malformed names, references to undeclared usersets,
//! tuplesets that are not stored relations, combinators with no children,
//! and cycles of computed references (which would never terminate no
//! matter the data). Traversal through tuplesets may recurse over data;
//! that is legal here and bounded at evaluation time instead.

use crate::definition::{PermissionExpr, SchemaDef};
use crate::error::SchemaError;
use ahash::AHashMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Whether a userset is backed by stored tuples or derived by rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsersetKind {
    Relation,
    Permission,
}

/// One evaluable name in a namespace.
#[derive(Debug, Clone)]
pub struct CompiledUserset {
    pub name: String,
    pub kind: UsersetKind,
    pub expr: PermissionExpr,
    /// Subject namespaces tuples may carry; empty means unconstrained.
    pub subject_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledNamespace {
    pub name: String,
    usersets: AHashMap<String, CompiledUserset>,
}

impl CompiledNamespace {
    pub fn userset(&self, name: &str) -> Option<&CompiledUserset> {
        self.usersets.get(name)
    }

    pub fn userset_names(&self) -> impl Iterator<Item = &str> {
        self.usersets.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSchema {
    namespaces: AHashMap<String, CompiledNamespace>,
}

impl CompiledSchema {
    pub fn namespace(&self, name: &str) -> Option<&CompiledNamespace> {
        self.namespaces.get(name)
    }

    pub fn namespace_names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

/// Compiles and validates a schema document.
pub fn compile(def: &SchemaDef) -> Result<CompiledSchema, SchemaError> {
    let mut namespaces: AHashMap<String, CompiledNamespace> = AHashMap::new();
    for ns in &def.namespaces {
        validate_identifier(&ns.name, "namespace name")?;
        if namespaces.contains_key(&ns.name) {
            return Err(SchemaError::DuplicateNamespace(ns.name.clone()));
        }

        // Relations and permissions share one name space per namespace.
        let mut usersets: AHashMap<String, CompiledUserset> = AHashMap::new();
        for relation in &ns.relations {
            validate_identifier(&relation.name, "relation name")?;
            if usersets.contains_key(&relation.name) {
                return Err(SchemaError::DuplicateUserset {
                    namespace: ns.name.clone(),
                    name: relation.name.clone(),
                });
            }
            usersets.insert(
                relation.name.clone(),
                CompiledUserset {
                    name: relation.name.clone(),
                    kind: UsersetKind::Relation,
                    expr: PermissionExpr::This,
                    subject_types: relation.subject_types.clone(),
                },
            );
        }
        for permission in &ns.permissions {
            validate_identifier(&permission.name, "permission name")?;
            if usersets.contains_key(&permission.name) {
                return Err(SchemaError::DuplicateUserset {
                    namespace: ns.name.clone(),
                    name: permission.name.clone(),
                });
            }
            usersets.insert(
                permission.name.clone(),
                CompiledUserset {
                    name: permission.name.clone(),
                    kind: UsersetKind::Permission,
                    expr: permission.expr.clone(),
                    subject_types: Vec::new(),
                },
            );
        }
        namespaces.insert(
            ns.name.clone(),
            CompiledNamespace {
                name: ns.name.clone(),
                usersets,
            },
        );
    }
    let schema = CompiledSchema { namespaces };

    for ns in schema.namespaces.values() {
        for userset in ns.usersets.values() {
            for subject_type in &userset.subject_types {
                if schema.namespace(subject_type).is_none() {
                    return Err(SchemaError::UnknownSubjectType {
                        namespace: ns.name.clone(),
                        relation: userset.name.clone(),
                        subject_type: subject_type.clone(),
                    });
                }
            }
        }
    }

    for ns in schema.namespaces.values() {
        for userset in ns.usersets.values() {
            check_expr(&schema, ns, &userset.name, &userset.expr)?;
        }
        check_cycles(ns)?;
    }

    Ok(schema)
}

fn validate_identifier(value: &str, context: &str) -> Result<(), SchemaError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            value: value.to_string(),
            context: context.to_string(),
        })
    }
}

fn check_expr(
    schema: &CompiledSchema,
    ns: &CompiledNamespace,
    userset: &str,
    expr: &PermissionExpr,
) -> Result<(), SchemaError> {
    match expr {
        PermissionExpr::This => Ok(()),
        PermissionExpr::ComputedUserset { relation } => {
            if ns.userset(relation).is_none() {
                return Err(SchemaError::UnknownReference {
                    namespace: ns.name.clone(),
                    userset: userset.to_string(),
                    reference: relation.clone(),
                });
            }
            Ok(())
        }
        PermissionExpr::TupleToUserset { tupleset, computed } => {
            let Some(set) = ns.userset(tupleset) else {
                return Err(SchemaError::UnknownReference {
                    namespace: ns.name.clone(),
                    userset: userset.to_string(),
                    reference: tupleset.clone(),
                });
            };
            if set.kind != UsersetKind::Relation {
                return Err(SchemaError::TuplesetNotRelation {
                    namespace: ns.name.clone(),
                    userset: userset.to_string(),
                    tupleset: tupleset.clone(),
                });
            }
            // With typed subjects the hop target is known statically;
            // untyped tuplesets fall back to skipping unknown names at
            // evaluation time.
            for subject_type in &set.subject_types {
                if let Some(target) = schema.namespace(subject_type) {
                    if target.userset(computed).is_none() {
                        return Err(SchemaError::MissingComputedOnSubjectType {
                            namespace: ns.name.clone(),
                            userset: userset.to_string(),
                            tupleset: tupleset.clone(),
                            subject_type: subject_type.clone(),
                            computed: computed.clone(),
                        });
                    }
                }
            }
            Ok(())
        }
        PermissionExpr::Union { children } | PermissionExpr::Intersection { children } => {
            if children.is_empty() {
                return Err(SchemaError::EmptyCombinator {
                    namespace: ns.name.clone(),
                    userset: userset.to_string(),
                });
            }
            for child in children {
                check_expr(schema, ns, userset, child)?;
            }
            Ok(())
        }
        PermissionExpr::Exclusion { include, exclude } => {
            check_expr(schema, ns, userset, include)?;
            check_expr(schema, ns, userset, exclude)
        }
    }
}

/// Rejects cycles among same-namespace computed references. Tupleset
/// traversal is excluded on purpose: it recurses over stored data and is
/// bounded by the evaluation depth limit, not statically.
fn check_cycles(ns: &CompiledNamespace) -> Result<(), SchemaError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: AHashMap<&str, NodeIndex> = AHashMap::new();
    for name in ns.usersets.keys() {
        let idx = graph.add_node(name.as_str());
        nodes.insert(name.as_str(), idx);
    }
    for (name, userset) in &ns.usersets {
        let mut refs = Vec::new();
        collect_computed_refs(&userset.expr, &mut refs);
        for target in refs {
            if let (Some(&from), Some(&to)) = (nodes.get(name.as_str()), nodes.get(target.as_str()))
            {
                graph.update_edge(from, to, ());
            }
        }
    }

    for component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|&idx| graph.find_edge(idx, idx).is_some());
        if cyclic {
            let mut cycle: Vec<String> = component
                .iter()
                .filter_map(|&idx| graph.node_weight(idx).map(|&name| name.to_string()))
                .collect();
            cycle.sort();
            return Err(SchemaError::CyclicDefinition {
                namespace: ns.name.clone(),
                cycle,
            });
        }
    }
    Ok(())
}

fn collect_computed_refs<'a>(expr: &'a PermissionExpr, refs: &mut Vec<&'a String>) {
    match expr {
        PermissionExpr::This | PermissionExpr::TupleToUserset { .. } => {}
        PermissionExpr::ComputedUserset { relation } => refs.push(relation),
        PermissionExpr::Union { children } | PermissionExpr::Intersection { children } => {
            for child in children {
                collect_computed_refs(child, refs);
            }
        }
        PermissionExpr::Exclusion { include, exclude } => {
            collect_computed_refs(include, refs);
            collect_computed_refs(exclude, refs);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
