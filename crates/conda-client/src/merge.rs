//! Installed/available package reconciliation.
//!
//! The service returns two name-sorted lists: the packages installed in an
//! environment (one build each) and the packages the channels offer (every
//! build). [`merge_packages`] walks both with one cursor each and produces a
//! single name-ordered list with one record per name.
//!
//! Installed packages missing from the available list (editable installs,
//! packages from channels no longer configured, or the whole installed list
//! when the available list was not fetched) are synthesized from their
//! installed record. When that happens the available cursor is replayed: the
//! same available entry is compared again against the next installed name.

use crate::channel::simplify_channel;
use crate::package::{PackageStatus, RawAvailablePackage, RawInstalledPackage, UnifiedPackage};

/// Merge installed and available packages into one annotated list.
///
/// Both inputs must be sorted ascending by name. The result is sorted by
/// name, has its channels shortened, and marks every installed package
/// `Installed` with `version_installed` set.
pub fn merge_packages(
    installed: &[RawInstalledPackage],
    available: &[RawAvailablePackage],
) -> Vec<UnifiedPackage> {
    let mut merged = Vec::with_capacity(available.len().max(installed.len()));
    let mut available_idx = 0;
    let mut installed_idx = 0;

    while installed_idx < installed.len() || available_idx < available.len() {
        let current = installed.get(installed_idx);

        let mut pkg = match (available.get(available_idx), current) {
            (Some(candidate), _) => UnifiedPackage::from_available(candidate),
            (None, Some(inst)) => UnifiedPackage::from_installed(inst),
            (None, None) => break,
        };
        let mut consumed_available = available_idx < available.len();

        if let Some(inst) = current {
            if pkg.name > inst.name {
                // Installed package unknown to the channels; keep the
                // available entry for the next round.
                pkg = UnifiedPackage::from_installed(inst);
                consumed_available = false;
            }
            if pkg.name == inst.name {
                pkg.version_installed = Some(inst.version.clone());
                pkg.status = PackageStatus::Installed;
                installed_idx += 1;
            }
        }

        if consumed_available {
            available_idx += 1;
        }

        pkg.channel = simplify_channel(&pkg.channel);
        merged.push(pkg);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn installed(name: &str, version: &str) -> RawInstalledPackage {
        RawInstalledPackage {
            name: name.to_string(),
            version: version.to_string(),
            build_number: 0,
            build_string: format!("{name}_0"),
            channel: "https://conda.anaconda.org/conda-forge/linux-64".to_string(),
            platform: "linux-64".to_string(),
        }
    }

    fn available(name: &str, versions: &[&str]) -> RawAvailablePackage {
        RawAvailablePackage {
            name: name.to_string(),
            version: versions.iter().map(|v| v.to_string()).collect(),
            build_number: vec![0; versions.len()],
            build_string: vec![format!("{name}_0"); versions.len()],
            channel: "https://conda.anaconda.org/conda-forge/noarch".to_string(),
            platform: "noarch".to_string(),
            summary: format!("The {name} package"),
            home: format!("https://example.org/{name}"),
            keywords: vec!["science".to_string()],
            tags: vec![],
        }
    }

    fn names(pkgs: &[UnifiedPackage]) -> Vec<&str> {
        pkgs.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_both_empty() {
        assert!(merge_packages(&[], &[]).is_empty());
    }

    #[test]
    fn test_installed_only_synthesis() {
        let merged = merge_packages(&[installed("a", "1.0")], &[]);
        assert_eq!(merged.len(), 1);
        let a = &merged[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.version, vec!["1.0"]);
        assert_eq!(a.build_string, vec!["a_0"]);
        assert_eq!(a.status, PackageStatus::Installed);
        assert_eq!(a.version_installed.as_deref(), Some("1.0"));
        assert!(a.summary.is_empty() && a.home.is_empty());
        assert!(a.keywords.is_empty() && a.tags.is_empty());
        assert_eq!(a.channel, "conda.anaconda.org/conda-forge");
    }

    #[test]
    fn test_available_only() {
        let merged = merge_packages(&[], &[available("a", &["1"]), available("b", &["2"])]);
        assert_eq!(names(&merged), vec!["a", "b"]);
        assert!(merged.iter().all(|p| p.status == PackageStatus::Available));
        assert!(merged.iter().all(|p| p.version_installed.is_none()));
    }

    #[test]
    fn test_installed_between_available() {
        let merged = merge_packages(
            &[installed("b", "2.0")],
            &[
                available("a", &["1.0"]),
                available("b", &["2.0", "2.1"]),
                available("c", &["3.0"]),
            ],
        );
        assert_eq!(names(&merged), vec!["a", "b", "c"]);

        assert_eq!(merged[0].status, PackageStatus::Available);
        assert_eq!(merged[1].status, PackageStatus::Installed);
        assert_eq!(merged[1].version_installed.as_deref(), Some("2.0"));
        assert_eq!(merged[1].version, vec!["2.0", "2.1"]);
        assert_eq!(merged[1].summary, "The b package");
        assert_eq!(merged[2].status, PackageStatus::Available);
    }

    #[test]
    fn test_installed_missing_from_available_replays_cursor() {
        // "b" and "d" are local installs the channels don't know about.
        let merged = merge_packages(
            &[installed("a", "1"), installed("b", "1"), installed("d", "1")],
            &[available("a", &["1"]), available("c", &["1"]), available("e", &["1"])],
        );
        assert_eq!(names(&merged), vec!["a", "b", "c", "d", "e"]);

        let status: Vec<PackageStatus> = merged.iter().map(|p| p.status).collect();
        assert_eq!(
            status,
            vec![
                PackageStatus::Installed,
                PackageStatus::Installed,
                PackageStatus::Available,
                PackageStatus::Installed,
                PackageStatus::Available,
            ]
        );
        assert!(merged[1].summary.is_empty());
        assert!(merged[3].summary.is_empty());
    }

    #[test]
    fn test_installed_tail_after_available_exhausted() {
        let merged = merge_packages(
            &[installed("a", "1"), installed("x", "1"), installed("y", "2")],
            &[available("a", &["1"])],
        );
        assert_eq!(names(&merged), vec!["a", "x", "y"]);
        assert!(merged.iter().all(|p| p.status == PackageStatus::Installed));
        assert_eq!(merged[2].version_installed.as_deref(), Some("2"));
    }

    #[test]
    fn test_installed_before_all_available() {
        let merged = merge_packages(
            &[installed("aaa", "1")],
            &[available("bbb", &["1"]), available("ccc", &["1"])],
        );
        assert_eq!(names(&merged), vec!["aaa", "bbb", "ccc"]);
        assert_eq!(merged[0].status, PackageStatus::Installed);
        assert_eq!(merged[1].status, PackageStatus::Available);
    }

    #[test]
    fn test_one_record_per_name_and_sorted() {
        let inst = vec![
            installed("attrs", "23.1"),
            installed("numpy", "1.26"),
            installed("pip", "23.3"),
            installed("zlib", "1.3"),
        ];
        let avail = vec![
            available("attrs", &["22.0", "23.1"]),
            available("bokeh", &["3.3"]),
            available("numpy", &["1.25", "1.26", "2.0"]),
            available("pandas", &["2.1"]),
            available("scipy", &["1.11"]),
        ];
        let merged = merge_packages(&inst, &avail);

        let got = names(&merged);
        let mut sorted = got.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(got, sorted);
        assert_eq!(
            got,
            vec!["attrs", "bokeh", "numpy", "pandas", "pip", "scipy", "zlib"]
        );

        let installed_names: Vec<&str> = merged
            .iter()
            .filter(|p| p.status == PackageStatus::Installed)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(installed_names, vec!["attrs", "numpy", "pip", "zlib"]);
    }

    #[test]
    fn test_merge_without_available_matches_synthesis() {
        let inst = vec![installed("a", "1"), installed("b", "2")];
        let merged = merge_packages(&inst, &[]);
        for (pkg, raw) in merged.iter().zip(&inst) {
            let mut expected = UnifiedPackage::from_installed(raw);
            expected.channel = simplify_channel(&raw.channel);
            expected.version_installed = Some(raw.version.clone());
            expected.status = PackageStatus::Installed;
            assert_eq!(pkg, &expected);
        }
    }

    #[test]
    fn test_channels_are_simplified() {
        let merged = merge_packages(&[], &[available("a", &["1"])]);
        assert_eq!(merged[0].channel, "conda.anaconda.org/conda-forge");
    }

    fn name_set() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[a-f]{1,3}", 0..12)
    }

    proptest! {
        /// Output is the sorted union of both name sets, one record each.
        #[test]
        fn prop_merge_yields_sorted_union(
            installed_names in name_set(),
            available_names in name_set(),
        ) {
            let inst: Vec<_> = installed_names.iter().map(|n| installed(n, "1")).collect();
            let avail: Vec<_> = available_names.iter().map(|n| available(n, &["1", "2"])).collect();
            let merged = merge_packages(&inst, &avail);

            let expected: Vec<&str> = installed_names
                .union(&available_names)
                .map(String::as_str)
                .collect();
            prop_assert_eq!(names(&merged), expected);
        }

        /// A record is Installed exactly when its name was installed.
        #[test]
        fn prop_installed_status_matches_installed_set(
            installed_names in name_set(),
            available_names in name_set(),
        ) {
            let inst: Vec<_> = installed_names.iter().map(|n| installed(n, "1")).collect();
            let avail: Vec<_> = available_names.iter().map(|n| available(n, &["1"])).collect();

            for pkg in merge_packages(&inst, &avail) {
                let is_installed = installed_names.contains(&pkg.name);
                prop_assert_eq!(pkg.status == PackageStatus::Installed, is_installed);
                prop_assert_eq!(pkg.version_installed.is_some(), is_installed);
            }
        }
    }
}
