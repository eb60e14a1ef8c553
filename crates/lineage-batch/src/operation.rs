use std::fmt;

use lineage_types::{AttrValue, AttributeKey, EntityId, Member};

/// What a queued operation does.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    /// Write an own value.
    Set(AttrValue),
    /// Read an own value.
    Get,
}

/// One queued store operation.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOperation {
    /// Caller-supplied identifier used to key the result of a `Get`.
    pub id: Option<String>,
    pub kind: OperationKind,
    pub key: AttributeKey,
    pub entity: EntityId,
    pub member: Option<Member>,
}

impl BatchOperation {
    pub fn set(
        key: AttributeKey,
        entity: EntityId,
        member: Option<Member>,
        value: AttrValue,
    ) -> Self {
        Self {
            id: None,
            kind: OperationKind::Set(value),
            key,
            entity,
            member,
        }
    }

    pub fn get(key: AttributeKey, entity: EntityId, member: Option<Member>) -> Self {
        Self {
            id: None,
            kind: OperationKind::Get,
            key,
            entity,
            member,
        }
    }

    /// Attach a caller-supplied identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_set(&self) -> bool {
        matches!(self.kind, OperationKind::Set(_))
    }

    pub fn is_get(&self) -> bool {
        matches!(self.kind, OperationKind::Get)
    }

    /// The key this operation's result is reported under.
    pub fn result_key(&self) -> ResultKey {
        match &self.id {
            Some(id) => ResultKey::Id(id.clone()),
            None => ResultKey::Target {
                key: self.key.clone(),
                entity: self.entity,
                member: self.member.clone(),
            },
        }
    }
}

/// Key of a flush result: the caller's id, or the addressed record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResultKey {
    Id(String),
    Target {
        key: AttributeKey,
        entity: EntityId,
        member: Option<Member>,
    },
}

impl ResultKey {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn target(key: AttributeKey, entity: EntityId, member: Option<Member>) -> Self {
        Self::Target {
            key,
            entity,
            member,
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Target {
                key,
                entity,
                member: Some(member),
            } => write!(f, "{key}@{entity}.{member}"),
            Self::Target { key, entity, .. } => write!(f, "{key}@{entity}"),
        }
    }
}
