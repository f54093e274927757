//! Request and response types for the engine API surface.
//!
//! All of these serialize with serde so a server layer can expose them
//! directly. Expansion trees are tagged enums; snapshot selection
//! defaults to the newest applied write when a request omits it.

use std::time::Duration;

use ahash::AHashSet;
use lattice_store::{ConsistencyToken, ObjectRef, Page, RelationTuple, SubjectRef, TupleFilter, UsersetRef};
use serde::{Deserialize, Serialize};

/// Snapshot selection for reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Evaluate at the newest fully applied write.
    #[default]
    Latest,
    /// Wait, within the configured bound, for the store to apply the
    /// token's write, then evaluate at exactly that snapshot.
    AtToken(ConsistencyToken),
}

/// One membership question: may `subject` exercise `permission` on `object`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub object: ObjectRef,
    /// Relation or permission name declared on the object's namespace.
    pub permission: String,
    pub subject: SubjectRef,
    #[serde(default)]
    pub consistency: Consistency,
    /// Caller deadline for this one evaluation. The engine uses the
    /// smaller of this and its configured evaluation budget.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl CheckRequest {
    pub fn new(object: ObjectRef, permission: &str, subject: SubjectRef) -> Self {
        Self {
            object,
            permission: permission.to_string(),
            subject,
            consistency: Consistency::Latest,
            timeout: None,
        }
    }

    /// Pins the check to the snapshot identified by `token`.
    pub fn at(mut self, token: ConsistencyToken) -> Self {
        self.consistency = Consistency::AtToken(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The answer to a check, together with the snapshot it was computed at.
///
/// Repeating the same check pinned to `token` yields the same answer
/// regardless of writes that landed in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDecision {
    pub allowed: bool,
    pub token: ConsistencyToken,
}

/// A request for the membership tree behind one userset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub object: ObjectRef,
    pub permission: String,
    #[serde(default)]
    pub consistency: Consistency,
    /// Optional cap below the engine's own depth limit.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

impl ExpandRequest {
    pub fn new(object: ObjectRef, permission: &str) -> Self {
        Self {
            object,
            permission: permission.to_string(),
            consistency: Consistency::Latest,
            max_depth: None,
        }
    }

    pub fn at(mut self, token: ConsistencyToken) -> Self {
        self.consistency = Consistency::AtToken(token);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandResponse {
    pub root: ExpandNode,
    pub token: ConsistencyToken,
}

/// One node of an expansion tree.
///
/// The tree mirrors the permission expression it was produced from, so
/// a reader can tell which rule admitted which subject. A frontier node
/// marks a userset deliberately left unexpanded: the depth budget ran
/// out, the path revisited it, or the pinned schema cannot resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpandNode {
    /// A subject granted directly by a stored tuple.
    Leaf { subject: SubjectRef },
    /// A userset left unexpanded.
    Frontier { userset: UsersetRef },
    /// The expansion of one referenced userset, labelled with its origin.
    Subtree { userset: UsersetRef, node: Box<ExpandNode> },
    Union { children: Vec<ExpandNode> },
    Intersection { children: Vec<ExpandNode> },
    Exclusion { include: Box<ExpandNode>, exclude: Box<ExpandNode> },
}

impl ExpandNode {
    /// Every leaf subject in the tree, in traversal order. This is a
    /// structural listing: leaves under an exclusion's `exclude` side
    /// appear too, since the tree reports what was consulted.
    pub fn leaves(&self) -> Vec<&SubjectRef> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    /// Distinct leaf subjects in first-seen order.
    ///
    /// The flat membership view of [`leaves`](Self::leaves): a subject
    /// admitted by several branches appears once.
    pub fn subjects(&self) -> Vec<SubjectRef> {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        for subject in self.leaves() {
            if seen.insert(subject.clone()) {
                out.push(subject.clone());
            }
        }
        out
    }

    /// True if any node in the tree is an unexpanded frontier.
    pub fn truncated(&self) -> bool {
        match self {
            Self::Leaf { .. } => false,
            Self::Frontier { .. } => true,
            Self::Subtree { node, .. } => node.truncated(),
            Self::Union { children } | Self::Intersection { children } => {
                children.iter().any(Self::truncated)
            }
            Self::Exclusion { include, exclude } => include.truncated() || exclude.truncated(),
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a SubjectRef>) {
        match self {
            Self::Leaf { subject } => out.push(subject),
            Self::Frontier { .. } => {}
            Self::Subtree { node, .. } => node.collect_leaves(out),
            Self::Union { children } | Self::Intersection { children } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            Self::Exclusion { include, exclude } => {
                include.collect_leaves(out);
                exclude.collect_leaves(out);
            }
        }
    }
}

/// A request to list stored tuples at one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub filter: TupleFilter,
    #[serde(default)]
    pub page: Page,
    #[serde(default)]
    pub consistency: Consistency,
}

impl ListRequest {
    pub fn new(filter: TupleFilter) -> Self {
        Self {
            filter,
            page: Page::default(),
            consistency: Consistency::Latest,
        }
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn at(mut self, token: ConsistencyToken) -> Self {
        self.consistency = Consistency::AtToken(token);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub tuples: Vec<RelationTuple>,
    /// Opaque cursor for the next page, absent on the last page.
    pub next_page_token: Option<String>,
    /// Snapshot the listing was taken at.
    pub token: ConsistencyToken,
}

// ============================================================================
// Tests
// ============================================================================
