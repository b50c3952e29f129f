//! Shared identifier, tenant, and pagination types
//!
//! All serialized types use camelCase JSON for wire compatibility with the
//! DTOs consumed by the rendering layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default page size when none is requested
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Upper bound on a single page
pub const MAX_PAGE_LIMIT: usize = 500;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Organization identifier; the tenant boundary for all data access
    OrgId
);
string_id!(
    /// User identifier supplied by the session provider
    UserId
);
string_id!(
    /// Project identifier, an optional narrower scope inside an organization
    ProjectId
);

/// Current user and organization for a request
///
/// Supplied by the hosting application's session provider and passed
/// explicitly to every collaborator that records or mutates state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub user_id: UserId,
    pub org_id: OrgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
}

impl TenantContext {
    pub fn new(user_id: impl Into<UserId>, org_id: impl Into<OrgId>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: org_id.into(),
            project_id: None,
        }
    }

    /// Narrow the context to a project
    pub fn with_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Offset/limit pagination for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Limit actually applied: zero falls back to the default, large values are clamped
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// A page of results plus the tenant-wide total
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Slice an already-ordered collection into a page
    pub fn from_sorted(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len();
        let limit = pagination.effective_limit();
        let items = all
            .into_iter()
            .skip(pagination.offset)
            .take(limit)
            .collect();
        Self {
            items,
            total,
            offset: pagination.offset,
            limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Current wall-clock time
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Generate a prefixed identifier (`<prefix>-<uuid>`)
pub(crate) fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
