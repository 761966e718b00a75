//! Dynamic predicate composition for filtered searches.
//!
//! Every filtered-search operation in the engine uses the same fold: an
//! arbitrary subset of optional fields, combined under a single AND/OR
//! flag. Absent fields contribute nothing. The neutral element is `true`
//! for conjunction and `false` for disjunction, so an all-empty filter
//! matches everything under AND and nothing under OR.

use serde::{Deserialize, Serialize};

use crate::id::{PermissionId, RoleId, TenantId, TenantRoleId, UserId};
use crate::model::{TenantRole, TenantRolePermission, TenantRoleUser};

/// How a string field is matched. Id fields are always equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Contains,
}

type Clause<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

/// Folds optional field clauses into one predicate over a record type.
pub struct PredicateBuilder<R> {
    conjunction: bool,
    clauses: Vec<Clause<R>>,
}

impl<R> PredicateBuilder<R> {
    /// `conjunction` selects AND (true) or OR (false) composition.
    pub fn new(conjunction: bool) -> Self {
        Self {
            conjunction,
            clauses: Vec::new(),
        }
    }

    /// Add an equality clause for a scalar/id field. `None` skips the
    /// field entirely.
    pub fn eq<T, F>(mut self, value: Option<T>, extract: F) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn(&R) -> T + Send + Sync + 'static,
    {
        if let Some(value) = value {
            self.clauses.push(Box::new(move |record| extract(record) == value));
        }
        self
    }

    /// Add a string clause, equality or substring depending on `mode`.
    pub fn text<F>(mut self, value: Option<String>, mode: MatchMode, extract: F) -> Self
    where
        F: Fn(&R) -> String + Send + Sync + 'static,
    {
        if let Some(value) = value {
            let clause: Clause<R> = match mode {
                MatchMode::Exact => Box::new(move |record| extract(record) == value),
                MatchMode::Contains => Box::new(move |record| extract(record).contains(&value)),
            };
            self.clauses.push(clause);
        }
        self
    }

    pub fn is_conjunction(&self) -> bool {
        self.conjunction
    }

    /// Evaluate the fold against one record.
    ///
    /// With no clauses this returns the neutral element: `true` under
    /// conjunction, `false` under disjunction.
    pub fn matches(&self, record: &R) -> bool {
        if self.conjunction {
            self.clauses.iter().all(|clause| clause(record))
        } else {
            self.clauses.iter().any(|clause| clause(record))
        }
    }
}

impl<R> core::fmt::Debug for PredicateBuilder<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PredicateBuilder")
            .field("conjunction", &self.conjunction)
            .field("clauses", &self.clauses.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-entity search filters
// ─────────────────────────────────────────────────────────────────────────────

/// Search filter over TenantRole rows.
///
/// `exact` only affects string fields and is carried for wire
/// compatibility; both fields here are ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRoleFilter {
    pub tenant_id: Option<TenantId>,
    pub role_id: Option<RoleId>,
    pub exact: bool,
    pub conjunction: bool,
}

impl TenantRoleFilter {
    pub fn new(tenant_id: Option<TenantId>, role_id: Option<RoleId>, exact: bool, conjunction: bool) -> Self {
        Self { tenant_id, role_id, exact, conjunction }
    }

    pub fn predicate(&self) -> PredicateBuilder<TenantRole> {
        PredicateBuilder::new(self.conjunction)
            .eq(self.tenant_id, |record: &TenantRole| record.tenant_id)
            .eq(self.role_id, |record| record.role_id)
    }
}

/// Search filter over TenantRolePermission rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrantFilter {
    pub tenant_role_id: Option<TenantRoleId>,
    pub permission_id: Option<PermissionId>,
    pub exact: bool,
    pub conjunction: bool,
}

impl PermissionGrantFilter {
    pub fn new(
        tenant_role_id: Option<TenantRoleId>,
        permission_id: Option<PermissionId>,
        exact: bool,
        conjunction: bool,
    ) -> Self {
        Self { tenant_role_id, permission_id, exact, conjunction }
    }

    pub fn predicate(&self) -> PredicateBuilder<TenantRolePermission> {
        PredicateBuilder::new(self.conjunction)
            .eq(self.tenant_role_id, |record: &TenantRolePermission| record.tenant_role_id)
            .eq(self.permission_id, |record| record.permission_id)
    }
}

/// Search filter over TenantRoleUser rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrantFilter {
    pub tenant_role_id: Option<TenantRoleId>,
    pub user_id: Option<UserId>,
    pub exact: bool,
    pub conjunction: bool,
}

impl UserGrantFilter {
    pub fn new(tenant_role_id: Option<TenantRoleId>, user_id: Option<UserId>, exact: bool, conjunction: bool) -> Self {
        Self { tenant_role_id, user_id, exact, conjunction }
    }

    pub fn predicate(&self) -> PredicateBuilder<TenantRoleUser> {
        PredicateBuilder::new(self.conjunction)
            .eq(self.tenant_role_id, |record: &TenantRoleUser| record.tenant_role_id)
            .eq(self.user_id, |record| record.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenant_role(id: i64, tenant: i64, role: i64) -> TenantRole {
        TenantRole {
            id: TenantRoleId::new(id),
            tenant_id: TenantId::new(tenant),
            role_id: RoleId::new(role),
        }
    }

    #[test]
    fn all_fields_absent_conjunction_matches_everything() {
        let filter = TenantRoleFilter::new(None, None, true, true);
        let predicate = filter.predicate();
        assert!(predicate.matches(&tenant_role(1, 100, 10)));
        assert!(predicate.matches(&tenant_role(2, 200, 20)));
    }

    #[test]
    fn all_fields_absent_disjunction_matches_nothing() {
        let filter = TenantRoleFilter::new(None, None, true, false);
        let predicate = filter.predicate();
        assert!(!predicate.matches(&tenant_role(1, 100, 10)));
        assert!(!predicate.matches(&tenant_role(2, 200, 20)));
    }

    #[test]
    fn conjunction_requires_every_informed_field() {
        let filter = TenantRoleFilter::new(Some(TenantId::new(100)), Some(RoleId::new(10)), true, true);
        let predicate = filter.predicate();
        assert!(predicate.matches(&tenant_role(1, 100, 10)));
        assert!(!predicate.matches(&tenant_role(2, 100, 11)));
        assert!(!predicate.matches(&tenant_role(3, 101, 10)));
    }

    #[test]
    fn disjunction_accepts_any_informed_field() {
        let filter = TenantRoleFilter::new(Some(TenantId::new(100)), Some(RoleId::new(10)), true, false);
        let predicate = filter.predicate();
        assert!(predicate.matches(&tenant_role(1, 100, 99)));
        assert!(predicate.matches(&tenant_role(2, 999, 10)));
        assert!(!predicate.matches(&tenant_role(3, 999, 99)));
    }

    #[test]
    fn absent_field_is_skipped_not_treated_as_mismatch() {
        let filter = TenantRoleFilter::new(Some(TenantId::new(100)), None, true, true);
        let predicate = filter.predicate();
        assert!(predicate.matches(&tenant_role(1, 100, 10)));
        assert!(predicate.matches(&tenant_role(2, 100, 20)));
        assert!(!predicate.matches(&tenant_role(3, 200, 10)));
    }

    #[test]
    fn text_clause_honors_match_mode() {
        #[derive(Clone)]
        struct Named {
            name: String,
        }

        let contains = PredicateBuilder::<Named>::new(true).text(
            Some("admin".to_string()),
            MatchMode::Contains,
            |record| record.name.clone(),
        );
        assert!(contains.matches(&Named { name: "tenant-administrator".to_string() }));

        let exact = PredicateBuilder::<Named>::new(true).text(
            Some("admin".to_string()),
            MatchMode::Exact,
            |record| record.name.clone(),
        );
        assert!(!exact.matches(&Named { name: "tenant-administrator".to_string() }));
        assert!(exact.matches(&Named { name: "admin".to_string() }));
    }

    proptest! {
        /// The fold is pointwise: conjunction holds iff every informed
        /// field matches, disjunction iff at least one does.
        #[test]
        fn fold_agrees_with_pointwise_evaluation(
            tenant_filter in proptest::option::of(0i64..5),
            role_filter in proptest::option::of(0i64..5),
            tenant in 0i64..5,
            role in 0i64..5,
            conjunction in proptest::bool::ANY,
        ) {
            let filter = TenantRoleFilter::new(
                tenant_filter.map(TenantId::new),
                role_filter.map(RoleId::new),
                true,
                conjunction,
            );
            let record = tenant_role(1, tenant, role);

            let informed: Vec<bool> = [
                tenant_filter.map(|value| value == tenant),
                role_filter.map(|value| value == role),
            ]
            .into_iter()
            .flatten()
            .collect();

            let expected = if conjunction {
                informed.iter().all(|matched| *matched)
            } else {
                informed.iter().any(|matched| *matched)
            };

            prop_assert_eq!(filter.predicate().matches(&record), expected);
        }
    }
}
