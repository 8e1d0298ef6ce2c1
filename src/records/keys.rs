//! Cache-key derivation per resource family.
//!
//! Keys are plain `prefix:id` strings under the tenant scope; the scope
//! itself is part of the key type, so only the resource portion is built
//! here.

use chrono::NaiveDate;

use crate::tenant::{ScopedKey, TenantScope};

pub fn patient(scope: &TenantScope, patient_id: &str) -> ScopedKey {
  scope.key(format!("patient:{}", patient_id))
}

pub fn appointments(scope: &TenantScope, day: NaiveDate) -> ScopedKey {
  scope.key(format!("appointments:{}", day.format("%Y-%m-%d")))
}

pub fn suggestions(scope: &TenantScope, category: &str) -> ScopedKey {
  scope.key(format!("suggestions:{}", category))
}

pub fn master_list(scope: &TenantScope, list: &str) -> ScopedKey {
  scope.key(format!("master:{}", list))
}
