//! `grantlink-core` — domain foundation for the association engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure
//! concerns): identifiers, association records, search filters, the
//! predicate fold, pagination, and the error taxonomy.

pub mod error;
pub mod filter;
pub mod id;
pub mod model;
pub mod page;

pub use error::{CascadeBlockedKind, EngineError, EngineResult, ReferenceKind};
pub use filter::{MatchMode, PermissionGrantFilter, PredicateBuilder, TenantRoleFilter, UserGrantFilter};
pub use id::{PermissionId, RoleId, TenantId, TenantRoleId, TenantRolePermissionId, TenantRoleUserId, UserId};
pub use model::{TenantRole, TenantRolePermission, TenantRoleUser};
pub use page::{Page, PageRequest};
