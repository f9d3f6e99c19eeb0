//! Hostname bindings of content roots.
//!
//! [`Domain`] is what callers see; [`CacheableDomain`] is the flat record
//! the cached storage layer keeps. Repositories map between the two.

use crate::model::entity::Entity;
use crate::model::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: Option<i64>,
    pub domain_name: String,
    pub root_content_id: Option<NodeId>,
    pub language_iso: Option<String>,
}

impl Domain {
    pub fn new(domain_name: impl Into<String>, root_content_id: Option<NodeId>) -> Self {
        Self {
            id: None,
            domain_name: domain_name.into(),
            root_content_id,
            language_iso: None,
        }
    }

    /// Wildcard bindings (`*1050`) only carry a language for a subtree.
    pub fn is_wildcard(&self) -> bool {
        self.domain_name.starts_with('*')
    }
}

impl Entity for Domain {
    type Id = i64;
    const CACHE_PREFIX: &'static str = "domain";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Flat row shape held by the full-dataset cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableDomain {
    pub id: Option<i64>,
    pub name: String,
    pub root_node_id: Option<NodeId>,
    pub language_iso: Option<String>,
}

impl Entity for CacheableDomain {
    type Id = i64;
    const CACHE_PREFIX: &'static str = "cacheable_domain";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl From<&Domain> for CacheableDomain {
    fn from(value: &Domain) -> Self {
        Self {
            id: value.id,
            name: value.domain_name.clone(),
            root_node_id: value.root_content_id,
            language_iso: value.language_iso.clone(),
        }
    }
}

impl From<CacheableDomain> for Domain {
    fn from(value: CacheableDomain) -> Self {
        Self {
            id: value.id,
            domain_name: value.name,
            root_content_id: value.root_node_id,
            language_iso: value.language_iso,
        }
    }
}
