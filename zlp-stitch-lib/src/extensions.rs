//! Selection of the image extensions carried into a stitched file.
//!
//! Pipeline outputs can contain per-aperture-radius copies of an image named
//! `{FAMILY}_{n}`. Only one radius is normally kept; the others are dropped by a
//! [DuplicateIndexRule].
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

fn indexed_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)_(\d+)$").expect("valid regex"))
}

/// Split `FAMILY_n` into its family and index.
#[must_use]
pub fn split_index(name: &str) -> Option<(&str, u32)> {
    let caps = indexed_name().captures(name)?;
    let family = caps.get(1)?.as_str();
    let index = caps.get(2)?.as_str().parse().ok()?;
    Some((family, index))
}

/// Drops extensions named `{FAMILY}_{n}` for every `n` in `dropped` except `keep`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIndexRule {
    dropped: BTreeSet<u32>,
    keep: Option<u32>,
    /// Families the rule applies to; `None` means all families.
    families: Option<HashSet<String>>,
}

impl Default for DuplicateIndexRule {
    fn default() -> Self {
        Self {
            dropped: (1..=13).collect(),
            keep: Some(2),
            families: None,
        }
    }
}

impl DuplicateIndexRule {
    #[must_use]
    pub fn new<I: IntoIterator<Item = u32>>(dropped: I) -> Self {
        Self {
            dropped: dropped.into_iter().collect(),
            keep: None,
            families: None,
        }
    }

    /// Index exempt from the rule.
    #[must_use]
    pub fn with_keep(mut self, keep: u32) -> Self {
        self.keep = Some(keep);
        self
    }

    /// Restrict the rule to the given families, compared ignoring case.
    #[must_use]
    pub fn with_families(mut self, families: &[&str]) -> Self {
        self.families = Some(families.iter().map(|f| f.to_uppercase()).collect());
        self
    }

    /// True if the rule drops `name`.
    #[must_use]
    pub fn drops(&self, name: &str) -> bool {
        let Some((family, index)) = split_index(name) else {
            return false;
        };
        if let Some(families) = &self.families {
            if !families.contains(&family.to_uppercase()) {
                return false;
            }
        }
        self.dropped.contains(&index) && self.keep != Some(index)
    }
}

/// Set of rules applied to the discovered extension names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    rules: Vec<DuplicateIndexRule>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            rules: vec![DuplicateIndexRule::default()],
        }
    }
}

impl ExtensionPolicy {
    /// A policy that keeps every extension.
    #[must_use]
    pub fn keep_all() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: DuplicateIndexRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[DuplicateIndexRule] {
        &self.rules
    }

    #[must_use]
    pub fn keeps(&self, name: &str) -> bool {
        !self.rules.iter().any(|r| r.drops(name))
    }

    /// Remove the names dropped by any rule.
    #[must_use]
    pub fn apply(&self, names: BTreeSet<String>) -> BTreeSet<String> {
        names
            .into_iter()
            .filter(|name| {
                let keep = self.keeps(name);
                if !keep {
                    debug!(%name, "dropping duplicate aperture extension");
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("FLUX", true; "plain name")]
    #[test_case("FLUX_2", true; "kept index")]
    #[test_case("FLUX_1", false; "first index")]
    #[test_case("FLUXERR_13", false; "last index")]
    #[test_case("FLUX_14", true; "outside range")]
    #[test_case("FLUX_", true; "no digits")]
    fn default_policy(name: &str, kept: bool) {
        assert_eq!(ExtensionPolicy::default().keeps(name), kept);
    }

    #[test]
    fn split() {
        assert_eq!(split_index("SKYBKG_3"), Some(("SKYBKG", 3)));
        assert_eq!(split_index("A_B_10"), Some(("A_B", 10)));
        assert_eq!(split_index("CASUDET"), None);
    }

    #[test]
    fn family_restricted_rule() {
        let policy = ExtensionPolicy::keep_all()
            .with_rule(DuplicateIndexRule::new(1..=3).with_families(&["flux"]));
        assert!(!policy.keeps("FLUX_1"));
        assert!(policy.keeps("FLUXERR_1"));
        assert!(policy.keeps("FLUX_4"));
    }

    #[test]
    fn explicit_indices() {
        let rule = DuplicateIndexRule::new([1, 5]);
        assert!(rule.drops("FLUX_1"));
        assert!(!rule.drops("FLUX_2"));
        assert!(rule.drops("FLUX_5"));
    }

    #[test]
    fn apply() {
        let names: BTreeSet<String> = ["FLUX", "FLUX_1", "FLUX_2", "HJD", "FLUX_3"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let kept: Vec<String> = ExtensionPolicy::default().apply(names).into_iter().collect();
        assert_eq!(kept, vec!["FLUX", "FLUX_2", "HJD"]);
    }
}
