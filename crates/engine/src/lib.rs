//! `grantlink-engine` — use-case layer over the association graph.
//!
//! Composes the persistence layer (`grantlink-store`) with the external
//! lookup contracts into the operations the adapter consumes:
//!
//! - [`guard`]: uniqueness and cascade-deletion checks run before writes.
//! - [`query`]: the read-side authorization questions (which permissions,
//!   which tenants, which roles, has-role, has-permission).
//! - [`orchestrator`]: single-shot validate-then-act use cases plus the
//!   read facade.
//! - [`lookup`]: contracts for the externally-owned entities (tenants,
//!   roles, permissions, active-tenant records) with in-memory fakes.

pub mod guard;
pub mod lookup;
pub mod orchestrator;
pub mod query;

pub use guard::{CascadeDeletionGuard, DeletionVerdict, UniquenessGuard};
pub use lookup::{
    ActiveTenantLookup, LookupError, PermissionLookup, RecordingActiveTenantLookup, RoleLookup, StaticPermissionLookup,
    StaticRoleLookup, StaticTenantLookup, TenantLookup,
};
pub use orchestrator::TenantRoleOrchestrator;
pub use query::AuthorizationQueryEngine;
