//! Where `mkdirp` cuts a path into directories to create.
//!
//! Pure byte logic, independent of the host, so the drive-root and UNC rules
//! can be exercised anywhere.  Separators are ASCII, so cutting UTF-8 at a
//! separator always lands on a character boundary.

/// Path syntax to segment by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// `\` native, `/` accepted and normalized, `C:\` and `\\server\share\`
    /// prefixes.
    Windows,
    Posix,
}

impl Style {
    pub const fn separator(self) -> u8 {
        match self {
            Self::Windows => b'\\',
            Self::Posix => b'/',
        }
    }
}

/// The normalized path plus every prefix that names a directory, shallowest
/// first.  A bare drive root or UNC share yields no prefixes: it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    path: Vec<u8>,
    cuts: Vec<usize>,
}

impl Plan {
    pub fn new(path: &[u8], style: Style) -> Self {
        let sep = style.separator();
        let path: Vec<u8> = match style {
            Style::Windows => path
                .iter()
                .map(|&b| if b == b'/' { sep } else { b })
                .collect(),
            Style::Posix => path.to_vec(),
        };
        let len = path.len();

        let mut i = match style {
            Style::Windows => windows_prefix_len(&path),
            Style::Posix => 0,
        };
        while i < len && path[i] == sep {
            i += 1;
        }

        let mut cuts = Vec::new();
        for j in i..=len {
            if j < len && path[j] != sep {
                continue;
            }
            // Nothing past the prefix yet, or a run of separators.
            if j == i || path[j - 1] == sep {
                continue;
            }
            cuts.push(j);
        }

        Self { path, cuts }
    }

    /// The path with separators in native form.
    pub fn normalized(&self) -> &[u8] {
        &self.path
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.cuts.iter().map(|&c| &self.path[..c])
    }
}

/// Length of a leading `C:\` or `\\server\share` prefix, which is never
/// created.  A bare `C:` counts in full.
fn windows_prefix_len(path: &[u8]) -> usize {
    let sep = Style::Windows.separator();

    if path.len() >= 2 && path[0].is_ascii_alphabetic() && path[1] == b':' {
        return match path.get(2) {
            None => 2,
            Some(&c) if c == sep => 3,
            Some(_) => 0,
        };
    }

    if path.len() >= 2 && path[0] == sep && path[1] == sep {
        // Skip `\\server\share`; the cut loop then skips the separator.
        let mut seen = 0;
        for (i, &b) in path.iter().enumerate().skip(2) {
            if b == sep {
                seen += 1;
                if seen == 2 {
                    return i;
                }
            }
        }
        return path.len();
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cuts(path: &str, style: Style) -> Vec<String> {
        Plan::new(path.as_bytes(), style)
            .prefixes()
            .map(|p| String::from_utf8(p.to_vec()).expect("utf-8"))
            .collect()
    }

    #[test]
    fn relative_posix_path_yields_each_ancestor() {
        assert_eq!(cuts("a/b/c", Style::Posix), ["a", "a/b", "a/b/c"]);
    }

    #[test]
    fn absolute_posix_path_skips_root() {
        assert_eq!(cuts("/var/lib/x", Style::Posix), ["/var", "/var/lib", "/var/lib/x"]);
        assert!(cuts("/", Style::Posix).is_empty());
    }

    #[test]
    fn repeated_and_trailing_separators_collapse() {
        assert_eq!(cuts("a//b/", Style::Posix), ["a", "a//b"]);
    }

    #[test]
    fn windows_normalizes_forward_slashes() {
        let plan = Plan::new(b"C:/data/chain", Style::Windows);
        assert_eq!(plan.normalized(), b"C:\\data\\chain");
        assert_eq!(
            cuts("C:/data/chain", Style::Windows),
            ["C:\\data", "C:\\data\\chain"]
        );
    }

    #[test]
    fn bare_drive_root_needs_nothing() {
        assert!(cuts("C:", Style::Windows).is_empty());
        assert!(cuts("d:\\", Style::Windows).is_empty());
    }

    #[test]
    fn unc_share_prefix_is_skipped() {
        assert_eq!(
            cuts(r"\\server\share\node\blocks", Style::Windows),
            [r"\\server\share\node", r"\\server\share\node\blocks"]
        );
        assert!(cuts(r"\\server\share", Style::Windows).is_empty());
        assert!(cuts(r"\\server\share\", Style::Windows).is_empty());
    }

    #[test]
    fn posix_keeps_backslashes_literal() {
        assert_eq!(cuts(r"a\b/c", Style::Posix), [r"a\b", r"a\b/c"]);
    }

    fn path_bytes() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(
            prop::sample::select(vec![b'a', b'b', b'C', b':', b'/', b'\\']),
            0..24,
        )
    }

    fn style() -> impl Strategy<Value = Style> {
        prop_oneof![Just(Style::Posix), Just(Style::Windows)]
    }

    proptest! {
        #[test]
        fn prefixes_end_at_a_separator_or_the_end(path in path_bytes(), style in style()) {
            let plan = Plan::new(&path, style);
            let full = plan.normalized();
            let sep = style.separator();
            let mut last = 0;

            for prefix in plan.prefixes() {
                prop_assert!(full.starts_with(prefix));
                prop_assert!(prefix.len() > last, "prefixes must grow strictly");
                prop_assert_ne!(prefix.last(), Some(&sep));
                prop_assert!(prefix.len() == full.len() || full[prefix.len()] == sep);
                last = prefix.len();
            }
        }

        #[test]
        fn windows_normalization_leaves_no_forward_slash(path in path_bytes()) {
            let plan = Plan::new(&path, Style::Windows);
            prop_assert_eq!(plan.normalized().len(), path.len());
            prop_assert!(!plan.normalized().contains(&b'/'));
        }
    }
}
