//! Relation tuple model
//!
//! A relation tuple states that a subject holds a relation on an object:
//! `Workspace:w1#view@User:alice` or, with a userset subject,
//! `Unit:u1#workspaces@Workspace:w1#owners`. Tuples are pure identity
//! values; storage backends attach version metadata separately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A namespaced object reference such as `Workspace:w1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// An object paired with one of its relations, naming the set of subjects
/// that hold that relation: `Workspace:w1#owners`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsersetRef {
    pub object: ObjectRef,
    pub relation: String,
}

impl UsersetRef {
    pub fn new(namespace: &str, id: &str, relation: &str) -> Self {
        Self {
            object: ObjectRef::new(namespace, id),
            relation: relation.to_string(),
        }
    }
}

impl fmt::Display for UsersetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object, self.relation)
    }
}

/// The subject side of a tuple: either a concrete object or a userset.
///
/// Userset subjects are what make membership nested; a tuple whose subject
/// is `Workspace:w1#owners` grants the relation to every subject that holds
/// `owners` on `Workspace:w1`, resolved at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectRef {
    Userset(UsersetRef),
    Object(ObjectRef),
}

impl SubjectRef {
    pub fn object(namespace: &str, id: &str) -> Self {
        Self::Object(ObjectRef::new(namespace, id))
    }

    pub fn userset(namespace: &str, id: &str, relation: &str) -> Self {
        Self::Userset(UsersetRef::new(namespace, id, relation))
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Object(obj) => &obj.namespace,
            Self::Userset(set) => &set.object.namespace,
        }
    }

    pub fn as_userset(&self) -> Option<&UsersetRef> {
        match self {
            Self::Userset(set) => Some(set),
            Self::Object(_) => None,
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(obj) => write!(f, "{obj}"),
            Self::Userset(set) => write!(f, "{set}"),
        }
    }
}

impl From<ObjectRef> for SubjectRef {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl From<UsersetRef> for SubjectRef {
    fn from(set: UsersetRef) -> Self {
        Self::Userset(set)
    }
}

/// A single relation fact: `object#relation@subject`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
}

impl RelationTuple {
    pub fn new(object: ObjectRef, relation: &str, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.to_string(),
            subject,
        }
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}

/// Errors from parsing the text notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTupleError {
    #[error("missing ':' between namespace and id in {0:?}")]
    MissingNamespace(String),
    #[error("missing '#' between object and relation in {0:?}")]
    MissingRelation(String),
    #[error("missing '@' between relation and subject in {0:?}")]
    MissingSubject(String),
    #[error("empty component in {0:?}")]
    EmptyComponent(String),
    #[error("reserved separator inside a component in {0:?}")]
    ReservedSeparator(String),
}

/// A component is one namespace, id or relation between separators. It
/// must be nonempty and must not itself contain `:`, `#` or `@`, so the
/// text form of any accepted tuple parses back to the same tuple.
fn require(part: &str, source: &str) -> Result<(), ParseTupleError> {
    if part.is_empty() {
        return Err(ParseTupleError::EmptyComponent(source.to_string()));
    }
    if part.contains([':', '#', '@'].as_slice()) {
        return Err(ParseTupleError::ReservedSeparator(source.to_string()));
    }
    Ok(())
}

impl FromStr for ObjectRef {
    type Err = ParseTupleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, id) = s
            .split_once(':')
            .ok_or_else(|| ParseTupleError::MissingNamespace(s.to_string()))?;
        require(namespace, s)?;
        require(id, s)?;
        Ok(Self::new(namespace, id))
    }
}

impl FromStr for SubjectRef {
    type Err = ParseTupleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((object, relation)) => {
                require(relation, s)?;
                let object: ObjectRef = object.parse()?;
                Ok(Self::Userset(UsersetRef {
                    object,
                    relation: relation.to_string(),
                }))
            }
            None => Ok(Self::Object(s.parse()?)),
        }
    }
}

impl FromStr for RelationTuple {
    type Err = ParseTupleError;

    /// Parses `Namespace:object#relation@SubjectNs:subject[#subrelation]`.
    /// The relation is the segment between the left side's last `#` and
    /// the `@`; stray separators end up inside a component and fail the
    /// component checks.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (left, subject) = s
            .split_once('@')
            .ok_or_else(|| ParseTupleError::MissingSubject(s.to_string()))?;
        let (object, relation) = left
            .rsplit_once('#')
            .ok_or_else(|| ParseTupleError::MissingRelation(s.to_string()))?;
        require(relation, s)?;
        Ok(Self {
            object: object.parse()?,
            relation: relation.to_string(),
            subject: subject.parse()?,
        })
    }
}

/// Filter for tuple listing queries; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    pub namespace: Option<String>,
    pub object: Option<String>,
    pub relation: Option<String>,
    pub subject: Option<SubjectRef>,
}

impl TupleFilter {
    /// All tuples under one object, any relation.
    pub fn by_object(namespace: &str, object: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            object: Some(object.to_string()),
            ..Self::default()
        }
    }

    /// All tuples held by one subject, anywhere.
    pub fn by_subject(subject: SubjectRef) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    pub fn with_relation(mut self, relation: &str) -> Self {
        self.relation = Some(relation.to_string());
        self
    }

    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        if let Some(namespace) = &self.namespace {
            if *namespace != tuple.object.namespace {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if *object != tuple.object.id {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if *relation != tuple.relation {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if *subject != tuple.subject {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
