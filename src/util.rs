//! Small shared helpers.

/// Print a warning to stderr.
///
/// All parent-side diagnostics go through here so they share one format.
/// Workers never call this; their warnings travel back to the parent as
/// protocol frames and are printed by the pool in arrival order.
pub fn warn(msg: &str) {
    eprintln!("warning: {msg}");
}

/// Case-fold a path or name for comparison.
///
/// Help archives reference files with arbitrary capitalisation, so every
/// lookup key in the crate is folded through this one function.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// Split a forward-slash path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Strip a trailing `#fragment` from a reference, returning `(path, anchor)`.
/// The anchor keeps its leading `#`.
pub fn split_anchor(reference: &str) -> (&str, Option<&str>) {
    match reference.find('#') {
        Some(pos) => (&reference[..pos], Some(&reference[pos..])),
        None => (reference, None),
    }
}
