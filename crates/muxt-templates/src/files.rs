//! Embedded file tables.
//!
//! [`Files`] is the value an [`crate::embed_files!`] invocation expands to:
//! a static table of `(relative path, contents)` pairs baked into the
//! binary. [`crate::TemplateSet::parse_files`] selects entries from it with
//! glob patterns.

/// A static table of embedded files, keyed by manifest-relative path.
#[derive(Debug, Clone, Copy)]
pub struct Files {
    entries: &'static [(&'static str, &'static str)],
}

impl Files {
    /// Used by the expansion of `embed_files!`; not meant to be called
    /// directly.
    pub const fn from_static(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, contents)| *contents)
    }

    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: &[(&str, &str)] = &[
        ("templates/index.html", "<h1>hi</h1>"),
        ("templates/row.html", "<li></li>"),
    ];

    #[test]
    fn lookup_by_path() {
        let files = Files::from_static(TABLE);
        assert_eq!(files.get("templates/index.html"), Some("<h1>hi</h1>"));
        assert_eq!(files.get("missing"), None);
        assert_eq!(files.len(), 2);
    }
}
