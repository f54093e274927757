//! Schema definition documents
//!
//! A schema declares namespaces; each namespace declares stored relations
//! and derived permissions. Permissions are rewrite expressions over the
//! namespace's own relations and, through tuple traversal, over related
//! objects' relations. Definitions are plain serde documents; nothing here
//! is validated until the document is compiled.

use serde::{Deserialize, Serialize};

/// Rewrite expression defining which subjects hold a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionExpr {
    /// Subjects granted directly by stored tuples under the evaluated name.
    This,
    /// Subjects holding another relation or permission on the same object.
    ComputedUserset { relation: String },
    /// Follows tuples of `tupleset` off this object, then evaluates
    /// `computed` on each subject found there.
    TupleToUserset { tupleset: String, computed: String },
    Union { children: Vec<PermissionExpr> },
    Intersection { children: Vec<PermissionExpr> },
    Exclusion {
        include: Box<PermissionExpr>,
        exclude: Box<PermissionExpr>,
    },
}

impl PermissionExpr {
    pub fn this() -> Self {
        Self::This
    }

    pub fn computed(relation: &str) -> Self {
        Self::ComputedUserset {
            relation: relation.to_string(),
        }
    }

    pub fn traverse(tupleset: &str, computed: &str) -> Self {
        Self::TupleToUserset {
            tupleset: tupleset.to_string(),
            computed: computed.to_string(),
        }
    }

    pub fn union(children: Vec<PermissionExpr>) -> Self {
        Self::Union { children }
    }

    pub fn intersection(children: Vec<PermissionExpr>) -> Self {
        Self::Intersection { children }
    }

    pub fn exclusion(include: PermissionExpr, exclude: PermissionExpr) -> Self {
        Self::Exclusion {
            include: Box::new(include),
            exclude: Box::new(exclude),
        }
    }
}

/// A stored relation: tuples may be written under this name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    /// Namespaces allowed on the subject side of tuples for this relation.
    /// Empty means unconstrained.
    #[serde(default)]
    pub subject_types: Vec<String>,
}

impl RelationDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subject_types: Vec::new(),
        }
    }

    pub fn with_subject_types(mut self, types: &[&str]) -> Self {
        self.subject_types = types.iter().map(ToString::to_string).collect();
        self
    }
}

/// A derived permission: evaluated through its rewrite expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDef {
    pub name: String,
    pub expr: PermissionExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDef {
    pub name: String,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub permissions: Vec<PermissionDef>,
}

impl NamespaceDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            relations: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_permission(mut self, name: &str, expr: PermissionExpr) -> Self {
        self.permissions.push(PermissionDef {
            name: name.to_string(),
            expr,
        });
        self
    }
}

/// The root schema document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub namespaces: Vec<NamespaceDef>,
}

impl SchemaDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: NamespaceDef) -> Self {
        self.namespaces.push(namespace);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn test_expr_json_is_tagged_by_type() {
        let expr = PermissionExpr::union(vec![
            PermissionExpr::this(),
            PermissionExpr::computed("owners"),
            PermissionExpr::traverse("workspaces", "owners"),
        ]);

        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["type"], "union");
        assert_eq!(json["children"][0]["type"], "this");
        assert_eq!(json["children"][1]["relation"], "owners");
        assert_eq!(json["children"][2]["tupleset"], "workspaces");

        let back: PermissionExpr = serde_json::from_value(json).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn test_schema_document_decodes_with_defaults() {
        let raw = r#"
        {
            "namespaces": [
                { "name": "User" },
                {
                    "name": "Workspace",
                    "relations": [
                        { "name": "users", "subject_types": ["User"] },
                        { "name": "owners", "subject_types": ["User"] }
                    ],
                    "permissions": [
                        {
                            "name": "view",
                            "expr": {
                                "type": "union",
                                "children": [
                                    { "type": "computed_userset", "relation": "users" },
                                    { "type": "computed_userset", "relation": "owners" }
                                ]
                            }
                        }
                    ]
                }
            ]
        }
        "#;

        let schema: SchemaDef = serde_json::from_str(raw).unwrap();
        assert_eq!(schema.namespaces.len(), 2);
        let user = &schema.namespaces[0];
        assert!(user.relations.is_empty() && user.permissions.is_empty());
        let workspace = &schema.namespaces[1];
        assert_eq!(workspace.relations.len(), 2);
        assert_eq!(workspace.permissions.len(), 1);
    }
}
