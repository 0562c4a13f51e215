// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The process-wide registry of attribute IDs.
//!
//! Attributes are opaque string keys in the per-packet and
//! per-context attribute maps. The registry only records which keys
//! exist and what they mean.

use crate::sync::KRwLock;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A packet carrying `RatelimitAdvisory=true` is passed, not dropped,
/// when a rate limiter finds it over its limit.
pub const RATELIMIT_ADVISORY: &str = "RatelimitAdvisory";

static ATTRIBUTES: LazyLock<KRwLock<BTreeMap<String, String>>> =
    LazyLock::new(|| {
        let mut m = BTreeMap::new();
        m.insert(
            RATELIMIT_ADVISORY.to_string(),
            "Rate limiting only counts, it does not drop".to_string(),
        );
        KRwLock::new(m)
    });

/// Register `id`. Returns false if it was already registered, in
/// which case the existing description is kept.
pub fn register(id: &str, description: &str) -> bool {
    let mut attrs = ATTRIBUTES.write();
    if attrs.contains_key(id) {
        return false;
    }
    attrs.insert(id.to_string(), description.to_string());
    true
}

pub fn describe(id: &str) -> Option<String> {
    ATTRIBUTES.read().get(id).cloned()
}

/// Every registered attribute and its description.
pub fn all() -> Vec<(String, String)> {
    ATTRIBUTES
        .read()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Is `val` a true attribute value?
pub fn is_true(val: Option<&str>) -> bool {
    matches!(val, Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_and_registered() {
        assert!(describe(RATELIMIT_ADVISORY).is_some());
        assert!(!register(RATELIMIT_ADVISORY, "again"));
        assert!(register("TestOnlyAttr", "used by this test"));
        assert_eq!(describe("TestOnlyAttr").as_deref(), Some("used by this test"));
        assert!(all().iter().any(|(k, _)| k == "TestOnlyAttr"));
    }

    #[test]
    fn truthiness() {
        assert!(is_true(Some("true")));
        assert!(is_true(Some("TRUE")));
        assert!(is_true(Some("1")));
        assert!(!is_true(Some("yes")));
        assert!(!is_true(None));
    }
}
