//! Tenant scoping for cache keys.
//!
//! Every cached read and queued mutation belongs to one `(clinic, doctor)`
//! pair. Keys embed the scope as a struct field rather than a string prefix,
//! so two tenants can never collide on a key even when resource ids do.

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// The active clinic/doctor pair all cache keys are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
  pub clinic_id: String,
  pub doctor_id: String,
}

impl TenantScope {
  pub fn new(clinic_id: impl Into<String>, doctor_id: impl Into<String>) -> Self {
    Self {
      clinic_id: clinic_id.into(),
      doctor_id: doctor_id.into(),
    }
  }

  /// Build a cache key for a resource within this scope.
  pub fn key(&self, resource: impl Into<String>) -> ScopedKey {
    ScopedKey {
      scope: self.clone(),
      resource: resource.into(),
    }
  }
}

impl std::fmt::Display for TenantScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.clinic_id, self.doctor_id)
  }
}

/// A tenant-scoped cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
  scope: TenantScope,
  resource: String,
}

impl ScopedKey {
  pub fn scope(&self) -> &TenantScope {
    &self.scope
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn in_scope(&self, scope: &TenantScope) -> bool {
    &self.scope == scope
  }
}

impl std::fmt::Display for ScopedKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.scope, self.resource)
  }
}

/// Resolves the active tenant scope.
///
/// Supplied by the embedding application (session state, login context).
pub trait TenantProvider: Send + Sync {
  /// The currently active scope, or `Validation` when no tenant is selected.
  fn current(&self) -> Result<TenantScope>;
}

/// Provider with a fixed scope. Useful for tests and single-clinic installs.
pub struct FixedTenant(TenantScope);

impl FixedTenant {
  pub fn new(scope: TenantScope) -> Self {
    Self(scope)
  }
}

impl TenantProvider for FixedTenant {
  fn current(&self) -> Result<TenantScope> {
    Ok(self.0.clone())
  }
}

/// Provider that fails until a scope is selected.
#[derive(Default)]
pub struct NoTenant;

impl TenantProvider for NoTenant {
  fn current(&self) -> Result<TenantScope> {
    Err(DataError::Validation("no active tenant".into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_differ_across_tenants() {
    let a = TenantScope::new("clinic-1", "dr-1");
    let b = TenantScope::new("clinic-2", "dr-1");

    // Same resource id, different tenants: the keys must not collide.
    assert_ne!(a.key("patient:42"), b.key("patient:42"));
    assert_eq!(a.key("patient:42"), a.key("patient:42"));
  }

  #[test]
  fn test_in_scope() {
    let a = TenantScope::new("clinic-1", "dr-1");
    let b = TenantScope::new("clinic-1", "dr-2");

    let key = a.key("appointments:2026-03-02");
    assert!(key.in_scope(&a));
    assert!(!key.in_scope(&b));
  }
}
