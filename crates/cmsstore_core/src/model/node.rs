//! Node tree primitives shared by every persisted entity kind.
//!
//! # Invariants
//! - `path == parent.path + "," + id` for every node.
//! - `level == parent.level + 1`; the root has level 0.
//! - `object_type` never changes after the node is created.

use uuid::Uuid;

/// Integer storage identity of a node.
pub type NodeId = i64;

/// Tree root every node descends from.
pub const ROOT_NODE_ID: NodeId = -1;
/// Parent of trashed documents.
pub const CONTENT_RECYCLE_BIN_ID: NodeId = -20;
/// Parent of trashed media items.
pub const MEDIA_RECYCLE_BIN_ID: NodeId = -21;

/// Discriminator stored in `nodes.object_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    SystemRoot,
    Document,
    DocumentType,
    Media,
    ContentRecycleBin,
    MediaRecycleBin,
}

impl ObjectType {
    pub const fn guid(self) -> Uuid {
        match self {
            Self::SystemRoot => Uuid::from_u128(0xea7d8624_4cfe_4578_a871_24aa946bf34d),
            Self::Document => Uuid::from_u128(0xc66ba18e_eaf3_4cff_8a22_41b16d66a972),
            Self::DocumentType => Uuid::from_u128(0xa2cb7800_f571_4787_9638_bc48539a0efb),
            Self::Media => Uuid::from_u128(0xb796f64c_1f99_4ffb_b886_4bf4bc011a9c),
            Self::ContentRecycleBin => Uuid::from_u128(0x01bb7ff2_24dc_4c0c_95a2_c24ef72bbac8),
            Self::MediaRecycleBin => Uuid::from_u128(0xcf3d8e34_1c1c_41e9_ae56_878b57b32113),
        }
    }

    pub fn from_guid(value: Uuid) -> Option<Self> {
        [
            Self::SystemRoot,
            Self::Document,
            Self::DocumentType,
            Self::Media,
            Self::ContentRecycleBin,
            Self::MediaRecycleBin,
        ]
        .into_iter()
        .find(|kind| kind.guid() == value)
    }

    /// Value stored in `nodes.object_type`.
    pub fn as_db(self) -> String {
        self.guid().to_string()
    }

    /// Bin node that trashed items of this type are moved under.
    pub fn recycle_bin_id(self) -> Option<NodeId> {
        match self {
            Self::Document => Some(CONTENT_RECYCLE_BIN_ID),
            Self::Media => Some(MEDIA_RECYCLE_BIN_ID),
            _ => None,
        }
    }
}

/// Row of the `nodes` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub unique_id: Uuid,
    pub parent_id: Option<NodeId>,
    pub path: String,
    pub level: i32,
    pub sort_order: i32,
    pub trashed: bool,
    pub created_by: Option<i64>,
    pub text: Option<String>,
    pub object_type: ObjectType,
    pub created_at: i64,
}

/// Path of a child node given its parent's path.
pub fn child_path(parent_path: &str, id: NodeId) -> String {
    format!("{parent_path},{id}")
}

/// Ancestor-or-self ids encoded in a path, root first.
pub fn path_ids(path: &str) -> Vec<NodeId> {
    path.split(',')
        .filter_map(|part| part.trim().parse::<NodeId>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{child_path, path_ids, ObjectType};

    #[test]
    fn child_path_appends_id() {
        assert_eq!(child_path("-1,5", 1042), "-1,5,1042");
    }

    #[test]
    fn path_ids_parses_negative_root() {
        assert_eq!(path_ids("-1,-20,1050"), vec![-1, -20, 1050]);
    }

    #[test]
    fn object_type_guid_roundtrips() {
        let guid = ObjectType::Document.guid();
        assert_eq!(ObjectType::from_guid(guid), Some(ObjectType::Document));
        assert_eq!(
            ObjectType::Document.as_db(),
            "c66ba18e-eaf3-4cff-8a22-41b16d66a972"
        );
    }
}
