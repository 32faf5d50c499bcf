//! Package records as served by the conda service and as presented to the UI.

use serde::{Deserialize, Deserializer, Serialize};

/// A package installed in an environment (one build).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstalledPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default)]
    pub build_string: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub platform: String,
}

/// A package known to the configured channels, with every known build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAvailablePackage {
    pub name: String,
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub build_number: Vec<u64>,
    #[serde(default)]
    pub build_string: Vec<String>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub home: String,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub tags: Vec<String>,
}

/// Deserialize a word list that accepts:
/// - `null` (no data)
/// - `"plotting, charts"` (comma-separated string)
/// - `["plotting", "charts"]` (JSON array)
fn deserialize_string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct StringListVisitor;

    impl<'de> de::Visitor<'de> for StringListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("null, a string or an array of strings")
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Vec<String>, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Vec<String>, E> {
            Ok(Vec::new())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Vec<String>, E> {
            Ok(v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Vec<String>, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                let trimmed = item.trim().to_string();
                if !trimmed.is_empty() {
                    items.push(trimmed);
                }
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(StringListVisitor)
}

/// Display status of a package.
///
/// [`merge_packages`](crate::merge_packages) only ever yields `Installed` or
/// `Available`. `Update` and `Remove` are selection states a front-end
/// assigns while the user prepares a batch of changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Installed,
    #[default]
    Available,
    Update,
    Remove,
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageStatus::Installed => write!(f, "installed"),
            PackageStatus::Available => write!(f, "available"),
            PackageStatus::Update => write!(f, "update"),
            PackageStatus::Remove => write!(f, "remove"),
        }
    }
}

/// Merged view of one package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedPackage {
    pub name: String,
    pub version: Vec<String>,
    pub build_number: Vec<u64>,
    pub build_string: Vec<String>,
    /// Shortened channel label, see [`simplify_channel`](crate::simplify_channel).
    pub channel: String,
    pub platform: String,
    pub summary: String,
    pub home: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_installed: Option<String>,
    pub status: PackageStatus,
    /// Set from [`PackageManager::check_updates`](crate::PackageManager::check_updates).
    #[serde(default)]
    pub updatable: bool,
}

impl UnifiedPackage {
    /// Record for a package known to the channels.
    pub fn from_available(pkg: &RawAvailablePackage) -> Self {
        Self {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            build_number: pkg.build_number.clone(),
            build_string: pkg.build_string.clone(),
            channel: pkg.channel.clone(),
            platform: pkg.platform.clone(),
            summary: pkg.summary.clone(),
            home: pkg.home.clone(),
            keywords: pkg.keywords.clone(),
            tags: pkg.tags.clone(),
            version_installed: None,
            status: PackageStatus::Available,
            updatable: false,
        }
    }

    /// Single-build record synthesized from an installed package.
    ///
    /// Registry metadata (summary, home, keywords, tags) stays empty since
    /// nothing was looked up.
    pub fn from_installed(pkg: &RawInstalledPackage) -> Self {
        Self {
            name: pkg.name.clone(),
            version: vec![pkg.version.clone()],
            build_number: vec![pkg.build_number],
            build_string: vec![pkg.build_string.clone()],
            channel: pkg.channel.clone(),
            platform: pkg.platform.clone(),
            summary: String::new(),
            home: String::new(),
            keywords: Vec::new(),
            tags: Vec::new(),
            version_installed: None,
            status: PackageStatus::Available,
            updatable: false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.version_installed.is_some()
    }
}

/// Which slice of the package list a caller wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageFilter {
    /// Installed packages only; the available list is not fetched.
    #[default]
    Installed,
    /// Packages that are not installed.
    Available,
    /// Everything.
    All,
    /// Installed packages with a newer build on the channels.
    Updatable,
}

impl PackageFilter {
    /// Whether a refresh under this filter needs the channels' package list.
    pub fn includes_available(&self) -> bool {
        matches!(self, PackageFilter::Available | PackageFilter::All)
    }

    pub fn matches(&self, pkg: &UnifiedPackage) -> bool {
        match self {
            PackageFilter::Installed => pkg.is_installed(),
            PackageFilter::Available => !pkg.is_installed(),
            PackageFilter::All => true,
            PackageFilter::Updatable => pkg.is_installed() && pkg.updatable,
        }
    }
}

impl std::fmt::Display for PackageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageFilter::Installed => write!(f, "installed"),
            PackageFilter::Available => write!(f, "available"),
            PackageFilter::All => write!(f, "all"),
            PackageFilter::Updatable => write!(f, "updatable"),
        }
    }
}

impl std::str::FromStr for PackageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "installed" => Ok(PackageFilter::Installed),
            "available" => Ok(PackageFilter::Available),
            "all" => Ok(PackageFilter::All),
            "updatable" => Ok(PackageFilter::Updatable),
            other => Err(format!("unknown package filter: {other}")),
        }
    }
}

/// Flag every package whose name is in `names` as updatable.
pub fn mark_updatable(packages: &mut [UnifiedPackage], names: &[String]) {
    for pkg in packages.iter_mut() {
        pkg.updatable = names.iter().any(|n| n == &pkg.name);
    }
}
