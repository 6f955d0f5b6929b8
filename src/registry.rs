//! Registry of help archives participating in a conversion.
//!
//! Maps each archive stem (filename without its `.chm`/`.chi`/`.chw`
//! extension) to the output subdirectory its contents were extracted into.
//! Single-archive runs use the empty subdirectory; multi-archive runs give
//! each archive its own. Stems compare case-insensitively everywhere.

use crate::error::{Error, Result};
use crate::util::fold;

const ARCHIVE_EXTENSIONS: [&str; 3] = [".chm", ".chi", ".chw"];

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub stem: String,
    folded: String,
    /// Output subdirectory, without trailing slash; empty for the root.
    pub subdir: String,
}

#[derive(Debug, Default)]
pub struct ArchiveRegistry {
    entries: Vec<ArchiveEntry>,
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive. Fatal if the folded stem is already present.
    pub fn register(&mut self, stem: &str, subdir: &str) -> Result<()> {
        let folded = fold(stem);
        if self.entries.iter().any(|e| e.folded == folded) {
            return Err(Error::DuplicateStem(stem.to_string()));
        }
        self.entries.push(ArchiveEntry {
            stem: stem.to_string(),
            folded,
            subdir: subdir.trim_end_matches('/').to_string(),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up by stem or by full archive filename (`name.chm`, `NAME.CHI`…);
    /// the extension is stripped case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        let folded = fold(strip_extension(name));
        self.entries.iter().find(|e| e.folded == folded)
    }

    /// Output subdirectory for an archive name, if registered.
    pub fn subdir_by_stem(&self, name: &str) -> Option<&str> {
        self.get(name).map(|e| e.subdir.as_str())
    }

    /// One-based ordinal of an archive, in registration order. Ordinals index
    /// the windows of the global topic table in multi-archive mode.
    pub fn ordinal(&self, name: &str) -> Option<u32> {
        let folded = fold(strip_extension(name));
        self.entries
            .iter()
            .position(|e| e.folded == folded)
            .map(|i| i as u32 + 1)
    }

    pub fn by_ordinal(&self, ordinal: u32) -> Option<&ArchiveEntry> {
        if ordinal == 0 {
            return None;
        }
        self.entries.get(ordinal as usize - 1)
    }

    /// The archive owning a root-relative path: the entry whose subdirectory
    /// is the longest proper prefix of the path. An empty subdirectory
    /// matches everything, so single-archive runs always resolve.
    pub fn owner_of(&self, root_rel: &str) -> Option<&ArchiveEntry> {
        let folded_path = fold(root_rel);
        self.entries
            .iter()
            .filter(|e| {
                e.subdir.is_empty() || {
                    let prefix = fold(&e.subdir);
                    folded_path.starts_with(&prefix)
                        && folded_path[prefix.len()..].starts_with('/')
                }
            })
            .max_by_key(|e| e.subdir.len())
    }
}

/// Parse an `ITS`/`MSITStore` scheme reference into `(archive, url)`.
///
/// Recognises `ms-its:NAME::URL` and `mk:@MSITStore:NAME::URL`, prefix
/// case-insensitive. The archive part is reduced to its basename, since
/// authoring tools sometimes bake in full paths.
pub fn parse_its_ref(reference: &str) -> Option<(&str, &str)> {
    let rest = strip_prefix_ci(reference, "ms-its:")
        .or_else(|| strip_prefix_ci(reference, "mk:@msitstore:"))?;
    let (archive, url) = rest.split_once("::")?;
    let archive = archive
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())?;
    Some((archive, url))
}

/// Strip a known archive extension, case-insensitively.
fn strip_extension(name: &str) -> &str {
    for ext in ARCHIVE_EXTENSIONS {
        let split = name.len().wrapping_sub(ext.len());
        if let Some(tail) = name.get(split..) {
            if tail.eq_ignore_ascii_case(ext) {
                return &name[..split];
            }
        }
    }
    name
}

/// ASCII-case-insensitive prefix strip.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// Join an archive subdirectory and an archive-relative path.
pub fn join_subdir(subdir: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if subdir.is_empty() {
        rel.to_string()
    } else {
        format!("{subdir}/{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut reg = ArchiveRegistry::new();
        reg.register("Win95UI", "win95ui").unwrap();
        assert_eq!(reg.subdir_by_stem("win95ui"), Some("win95ui"));
        assert_eq!(reg.subdir_by_stem("WIN95UI"), Some("win95ui"));
        assert_eq!(reg.subdir_by_stem("Win95UI.chm"), Some("win95ui"));
        assert_eq!(reg.subdir_by_stem("win95ui.CHI"), Some("win95ui"));
        assert_eq!(reg.subdir_by_stem("other"), None);
    }

    #[test]
    fn duplicate_stem_is_fatal() {
        let mut reg = ArchiveRegistry::new();
        reg.register("a", "a").unwrap();
        assert!(matches!(
            reg.register("A", "a2"),
            Err(Error::DuplicateStem(_))
        ));
    }

    #[test]
    fn owner_prefers_longest_prefix() {
        let mut reg = ArchiveRegistry::new();
        reg.register("base", "").unwrap();
        reg.register("other", "other").unwrap();
        assert_eq!(reg.owner_of("html/x.htm").unwrap().stem, "base");
        assert_eq!(reg.owner_of("other/x.htm").unwrap().stem, "other");
        assert_eq!(reg.owner_of("Other/x.htm").unwrap().stem, "other");
        // "otherx" is not inside "other/".
        assert_eq!(reg.owner_of("otherx/x.htm").unwrap().stem, "base");
    }

    #[test]
    fn ordinals_follow_registration_order() {
        let mut reg = ArchiveRegistry::new();
        reg.register("a", "a").unwrap();
        reg.register("b", "b").unwrap();
        assert_eq!(reg.ordinal("a"), Some(1));
        assert_eq!(reg.ordinal("B.chm"), Some(2));
        assert_eq!(reg.by_ordinal(2).unwrap().stem, "b");
        assert!(reg.by_ordinal(0).is_none());
    }

    #[test]
    fn its_scheme_parsing() {
        assert_eq!(
            parse_its_ref("ms-its:other.chm::/foo/bar.htm"),
            Some(("other.chm", "/foo/bar.htm"))
        );
        assert_eq!(
            parse_its_ref("MK:@MSITStore:C:\\help\\Other.CHM::/x.htm"),
            Some(("Other.CHM", "/x.htm"))
        );
        assert_eq!(parse_its_ref("ms-its:broken.chm:/x.htm"), None);
        assert_eq!(parse_its_ref("http://x::y"), None);
    }

    #[test]
    fn join_subdir_forms() {
        assert_eq!(join_subdir("", "html/a.htm"), "html/a.htm");
        assert_eq!(join_subdir("sub", "html/a.htm"), "sub/html/a.htm");
        assert_eq!(join_subdir("sub", "/html/a.htm"), "sub/html/a.htm");
    }
}
