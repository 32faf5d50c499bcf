//! Channel labels for display.
//!
//! conda reports a package's channel as a full URL such as
//! `https://conda.anaconda.org/conda-forge/linux-64`. The package list only
//! has room for a short label, so the URL is reduced to its first
//! significant segment and its last non-platform segment.

/// Platform subdirectories conda appends to channel URLs.
pub const PLATFORM_SUBDIRS: [&str; 11] = [
    "linux-64",
    "linux-32",
    "linux-aarch64",
    "linux-armv6l",
    "linux-armv7l",
    "linux-ppc64le",
    "osx-64",
    "osx-arm64",
    "win-32",
    "win-64",
    "noarch",
];

const URL_SCHEMES: [&str; 3] = ["http:", "https:", "file:"];

/// Shorten a channel URL to `<first>[/...]/<last>`.
///
/// Channels with at most two `/`-separated segments are returned unchanged.
/// Otherwise scheme tokens and empty segments are skipped at the front and the
/// trailing run of platform subdirectories is dropped at the back; `/...`
/// marks elided segments in between. Applying it twice gives the same label.
///
/// ```
/// use conda_client::simplify_channel;
///
/// assert_eq!(simplify_channel("conda-forge"), "conda-forge");
/// assert_eq!(
///     simplify_channel("https://repo.anaconda.com/pkgs/main/noarch"),
///     "repo.anaconda.com/.../main"
/// );
/// ```
pub fn simplify_channel(channel: &str) -> String {
    let segments: Vec<&str> = channel.split('/').collect();
    if segments.len() <= 2 {
        return channel.to_string();
    }

    let mut first = 0;
    while first < segments.len()
        && (segments[first].is_empty() || URL_SCHEMES.contains(&segments[first]))
    {
        first += 1;
    }
    if first == segments.len() {
        return channel.to_string();
    }

    let mut last = segments.len() - 1;
    while last > first && PLATFORM_SUBDIRS.contains(&segments[last]) {
        last -= 1;
    }

    if last == first {
        return segments[first].to_string();
    }
    if last > first + 1 {
        format!("{}/.../{}", segments[first], segments[last])
    } else {
        format!("{}/{}", segments[first], segments[last])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_channels_unchanged() {
        assert_eq!(simplify_channel("conda-forge"), "conda-forge");
        assert_eq!(simplify_channel("pkgs/main"), "pkgs/main");
        assert_eq!(simplify_channel("conda-forge/linux-64"), "conda-forge/linux-64");
        assert_eq!(simplify_channel(""), "");
    }

    #[test]
    fn test_anaconda_org_channel() {
        assert_eq!(
            simplify_channel("https://conda.anaconda.org/conda-forge/linux-64"),
            "conda.anaconda.org/conda-forge"
        );
    }

    #[test]
    fn test_elided_middle_segments() {
        assert_eq!(
            simplify_channel("https://repo.continuum.io/pkgs/main/noarch"),
            "repo.continuum.io/.../main"
        );
        assert_eq!(
            simplify_channel("http://mirror.local/a/b/c/d/win-64/noarch"),
            "mirror.local/.../d"
        );
    }

    #[test]
    fn test_file_channel() {
        assert_eq!(
            simplify_channel("file:///opt/conda-bld/linux-64"),
            "opt/conda-bld"
        );
    }

    #[test]
    fn test_only_platform_after_host() {
        assert_eq!(simplify_channel("https://example.com/noarch"), "example.com");
    }

    #[test]
    fn test_all_empty_segments() {
        assert_eq!(simplify_channel("///"), "///");
    }

    #[test]
    fn test_repeated_scheme_tokens_are_skipped() {
        assert_eq!(simplify_channel("https://http:/x/y"), "x/y");
        assert_eq!(simplify_channel("https:/https:/a/b"), "a/b");
        assert_eq!(simplify_channel("file://https:/a/b/c/noarch"), "a/.../c");
    }

    #[test]
    fn test_idempotent() {
        for channel in [
            "https://conda.anaconda.org/conda-forge/linux-64",
            "https://repo.continuum.io/pkgs/main/noarch",
            "file:///opt/conda-bld/linux-64",
            "https://example.com/noarch",
            "a/b/c/linux-64",
            "pkgs/free",
            "<develop>",
            "https://http:/x/y",
            "https:/https:/a/b",
        ] {
            let once = simplify_channel(channel);
            assert_eq!(simplify_channel(&once), once, "channel {channel}");
        }
    }
}
