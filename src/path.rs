//! Pure path algebra for root-relative and document-relative references.
//!
//! Paths are forward-slash separated sequences of non-empty segments.
//! *Root-relative* paths are anchored at the output directory;
//! *document-relative* paths are anchored at a particular HTML page and may
//! contain `..`. Input case is arbitrary; [`resolve_mixed_case`] maps a path
//! to the capitalisation actually present on disk.

use crate::fs_cache::FsCache;
use crate::util::segments;

/// Resolve a link `rel` appearing inside the document at root-relative path
/// `doc` to the root-relative target.
///
/// `.` and empty segments are dropped; `..` pops the accumulator. Returns
/// `None` when the reference escapes above the root or when it has no final
/// file segment (a pure directory reference).
pub fn doc_to_root(rel: &str, doc: &str) -> Option<String> {
    let mut acc: Vec<&str> = segments(doc);
    // Drop the document's own filename; what remains is its directory.
    acc.pop();

    let mut last_was_push = false;
    for seg in rel.split('/') {
        match seg {
            "" | "." => last_was_push = false,
            ".." => {
                acc.pop()?;
                last_was_push = false;
            }
            other => {
                acc.push(other);
                last_was_push = true;
            }
        }
    }
    if !last_was_push {
        return None;
    }
    Some(acc.join("/"))
}

/// Minimal document-relative reference from `doc` to root-relative `target`.
///
/// Strips the (case-sensitive) common directory prefix, emits one `..` per
/// remaining directory of `doc`, then the remaining segments of `target`.
pub fn root_to_doc(target: &str, doc: &str) -> String {
    let target_segs = segments(target);
    let mut doc_dirs = segments(doc);
    doc_dirs.pop();

    let common = doc_dirs
        .iter()
        .zip(target_segs.iter())
        .take_while(|(a, b)| a == b)
        .count();
    // Never consume the target's filename as a common prefix.
    let common = common.min(target_segs.len().saturating_sub(1));

    let mut out: Vec<&str> = Vec::new();
    for _ in common..doc_dirs.len() {
        out.push("..");
    }
    out.extend(&target_segs[common..]);
    out.join("/")
}

/// Canonically-cased version of a root-relative `path`, anchored at the
/// root-relative directory `prefix` (`""` for the output root).
///
/// If the exact path exists it is returned as-is. Otherwise each segment is
/// matched against the case-insensitive directory listing at the accumulated
/// prefix, depth-first, first match in enumeration order winning. Returns
/// `None` when no candidate resolves to an existing entry.
pub fn resolve_mixed_case(cache: &FsCache, path: &str, prefix: &str) -> Option<String> {
    let joined = if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    };
    if cache.exists(&joined) {
        return Some(joined);
    }
    let segs = segments(path);
    if segs.is_empty() {
        return None;
    }
    resolve_segments(cache, prefix, &segs)
}

fn resolve_segments(cache: &FsCache, at: &str, segs: &[&str]) -> Option<String> {
    let (head, rest) = segs.split_first()?;
    for candidate in cache.case_insensitive_children(at, head) {
        let next = if at.is_empty() {
            candidate
        } else {
            format!("{at}/{candidate}")
        };
        if rest.is_empty() {
            if cache.exists(&next) {
                return Some(next);
            }
        } else if let Some(found) = resolve_segments(cache, &next, rest) {
            return Some(found);
        }
    }
    None
}
