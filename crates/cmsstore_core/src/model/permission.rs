//! Node permission grants.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};

/// User or user-group identity a permission is granted to.
pub type PrincipalId = i64;

/// Permissions one principal holds on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityPermission {
    pub principal_id: PrincipalId,
    pub entity_id: NodeId,
    /// Single-character permission codes, sorted and unique.
    pub permissions: Vec<char>,
}

impl EntityPermission {
    pub fn new(principal_id: PrincipalId, entity_id: NodeId, permissions: &[char]) -> Self {
        let mut permissions = permissions.to_vec();
        permissions.sort_unstable();
        permissions.dedup();
        Self {
            principal_id,
            entity_id,
            permissions,
        }
    }
}

/// Full grant set of one node across principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPermissionSet {
    pub entity_id: NodeId,
    pub permissions: Vec<EntityPermission>,
}
