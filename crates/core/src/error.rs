//! Error taxonomy for the association engine.
//!
//! Every failure an engine operation can surface is one of these kinds.
//! They are raised at the point of detection and propagate unmodified to
//! the adapter layer; the engine performs no internal retries and never
//! folds one kind into another.

use serde::Serialize;
use thiserror::Error;

use crate::id::TenantRoleId;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Which external entity an invalid reference points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Tenant,
    Role,
    Permission,
    TenantRole,
}

impl core::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReferenceKind::Tenant => "tenant",
            ReferenceKind::Role => "role",
            ReferenceKind::Permission => "permission",
            ReferenceKind::TenantRole => "tenant role",
        };
        f.write_str(s)
    }
}

/// Which dependent association blocks a TenantRole delete.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeBlockedKind {
    Users,
    Permissions,
}

impl core::fmt::Display for CascadeBlockedKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            CascadeBlockedKind::Users => "users",
            CascadeBlockedKind::Permissions => "permissions",
        };
        f.write_str(s)
    }
}

/// Engine-level error.
///
/// Domain kinds mirror the failure semantics of the use cases; `Storage`
/// is the one infrastructure kind (backend unavailable, query failed) and
/// is the only kind the adapter maps to a 5xx other than `Communication`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A mandatory identifier or field was not supplied.
    #[error("mandatory parameter not informed: {0}")]
    MissingParameter(String),

    /// A referenced external entity does not exist.
    #[error("no {kind} found for id {id}")]
    InvalidReference { kind: ReferenceKind, id: i64 },

    /// A composite-key uniqueness invariant was violated, whether caught
    /// proactively or by the storage constraint.
    #[error("duplicated value for {0}")]
    DuplicateAssociation(String),

    /// A lookup by id or composite key found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A TenantRole delete is blocked by dependent associations.
    #[error("tenant role {tenant_role_id} still has {blocked_by} associated")]
    CascadeBlocked {
        blocked_by: CascadeBlockedKind,
        tenant_role_id: TenantRoleId,
    },

    /// An external collaborator call failed or timed out. Distinguished
    /// from `InvalidReference` so callers can retry only this kind.
    #[error("communication failure: {0}")]
    Communication(String),

    /// Storage backend failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingParameter(field.into())
    }

    pub fn invalid_reference(kind: ReferenceKind, id: impl Into<i64>) -> Self {
        Self::InvalidReference { kind, id: id.into() }
    }

    pub fn duplicate(fields: impl Into<String>) -> Self {
        Self::DuplicateAssociation(fields.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn cascade_blocked(blocked_by: CascadeBlockedKind, tenant_role_id: TenantRoleId) -> Self {
        Self::CascadeBlocked { blocked_by, tenant_role_id }
    }

    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_blocked_names_the_dependent_kind() {
        let err = EngineError::cascade_blocked(CascadeBlockedKind::Users, TenantRoleId::new(55));
        assert_eq!(err.to_string(), "tenant role 55 still has users associated");

        let err = EngineError::cascade_blocked(CascadeBlockedKind::Permissions, TenantRoleId::new(55));
        assert_eq!(err.to_string(), "tenant role 55 still has permissions associated");
    }

    #[test]
    fn invalid_reference_names_the_offending_id() {
        let err = EngineError::invalid_reference(ReferenceKind::Tenant, 100i64);
        assert_eq!(err.to_string(), "no tenant found for id 100");
    }
}
