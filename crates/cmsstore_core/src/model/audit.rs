//! Append-only audit trail entries.

use crate::model::entity::Entity;
use crate::model::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Save,
    Publish,
    Unpublish,
    Move,
    Delete,
    RecycleBinEmptied,
}

impl AuditAction {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::RecycleBinEmptied => "recycle_bin_emptied",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "save" => Some(Self::Save),
            "publish" => Some(Self::Publish),
            "unpublish" => Some(Self::Unpublish),
            "move" => Some(Self::Move),
            "delete" => Some(Self::Delete),
            "recycle_bin_emptied" => Some(Self::RecycleBinEmptied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: Option<i64>,
    /// Cleared when the node is purged; the entry itself survives.
    pub node_id: Option<NodeId>,
    pub user_id: i64,
    pub action: AuditAction,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl AuditEntry {
    pub fn new(node_id: Option<NodeId>, user_id: i64, action: AuditAction) -> Self {
        Self {
            id: None,
            node_id,
            user_id,
            action,
            comment: None,
            created_at: 0,
        }
    }
}

impl Entity for AuditEntry {
    type Id = i64;
    const CACHE_PREFIX: &'static str = "audit";

    fn id(&self) -> Option<i64> {
        self.id
    }
}
