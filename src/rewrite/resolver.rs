//! Reference resolution: from a raw `href` in source markup to the link
//! that belongs in the output site.
//!
//! Resolution handles plain relative references, absolute references against
//! the owning archive's subdirectory, `ms-its:`/`mk:@MSITStore:` scheme
//! references into sibling archives, and `JavaScript:ID.Click()` calls that
//! fire an embedded HTML Help control. Anything that cannot be mapped
//! degrades to `#` with a warning carrying the page and line; the run never
//! aborts on a bad link.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::chm::{KeywordEntry, Topic};
use crate::path::root_to_doc;
use crate::registry::{join_subdir, parse_its_ref};
use crate::scan::page::ObjectRecord;
use crate::scan::{has_scheme, TreeData};
use crate::util::{split_anchor, warn};

/// Marker class applied to links that lead to a multi-topic resolution page.
pub const MULTI_LINK_CLASS: &str = "chmweb-multi-link";

/// `JavaScript:ID.Click()` — only this exact syntactic form fires an
/// embedded control; every other `javascript:` reference is an external
/// scheme and passes through untouched.
static CLICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^javascript:\s*([A-Za-z_][A-Za-z0-9_]*)\.Click\(\)\s*;?\s*$").unwrap()
});

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The reference to emit: document-relative, external, or `#`.
    pub href: String,
    /// Frame target to add when the element has none.
    pub target: Option<String>,
    /// Marker class to add, for multi-topic links.
    pub class: Option<&'static str>,
    /// Whether `href` differs from the source reference.
    pub changed: bool,
}

impl Resolved {
    fn unchanged(reference: &str) -> Self {
        Self {
            href: reference.to_string(),
            target: None,
            class: None,
            changed: false,
        }
    }

    fn broken() -> Self {
        Self {
            href: "#".to_string(),
            target: None,
            class: None,
            changed: true,
        }
    }

    /// Whether rewriting must touch the element at all.
    pub fn needs_rewrite(&self, has_target_attr: bool) -> bool {
        self.changed || self.class.is_some() || (self.target.is_some() && !has_target_attr)
    }
}

pub struct Resolver<'a> {
    data: &'a TreeData,
    resolutions: RefCell<ResolutionPages>,
}

impl<'a> Resolver<'a> {
    pub fn new(data: &'a TreeData) -> Self {
        Self {
            data,
            resolutions: RefCell::new(ResolutionPages::default()),
        }
    }

    /// The resolution pages registered while rewriting, for emission once
    /// every page has been processed.
    pub fn into_resolution_pages(self) -> ResolutionPages {
        self.resolutions.into_inner()
    }

    /// Resolve a reference appearing in the page at root-relative `doc`.
    pub fn resolve(&self, reference: &str, doc: &str, line: u32) -> Resolved {
        if reference.starts_with('#') {
            return Resolved::unchanged(reference);
        }

        if let Some((archive, url)) = parse_its_ref(reference) {
            let Some(subdir) = self.data.registry.subdir_by_stem(archive) else {
                warn(&format!(
                    "{doc}:{line}: reference into unknown archive {archive:?}, left external"
                ));
                return Resolved::unchanged(reference);
            };
            let (path, anchor) = split_anchor(url);
            return self.resolve_root_rel(&join_subdir(subdir, path), anchor, doc, line);
        }

        if has_scheme(reference) {
            return Resolved::unchanged(reference);
        }

        let (path, anchor) = split_anchor(reference);
        let root_rel = if let Some(abs) = path.strip_prefix('/') {
            let subdir = self
                .data
                .registry
                .owner_of(doc)
                .map(|e| e.subdir.clone())
                .unwrap_or_default();
            Some(join_subdir(&subdir, abs))
        } else {
            crate::path::doc_to_root(path, doc)
        };
        let Some(root_rel) = root_rel else {
            warn(&format!(
                "{doc}:{line}: reference {reference:?} escapes the output tree"
            ));
            return Resolved::broken();
        };

        let mut resolved = self.resolve_root_rel(&root_rel, anchor, doc, line);
        if resolved.href == reference {
            resolved.changed = false;
        }
        resolved
    }

    /// Steps 8–10: map a root-relative path through the link map, apply the
    /// contents-tree target rules, and convert back to a document-relative
    /// reference.
    fn resolve_root_rel(
        &self,
        root_rel: &str,
        anchor: Option<&str>,
        doc: &str,
        line: u32,
    ) -> Resolved {
        let Some(canonical) = self.data.lookup_link(root_rel).map(String::from) else {
            warn(&format!("{doc}:{line}: unresolved reference to {root_rel:?}"));
            return Resolved::broken();
        };

        let mut target = None;
        let mut path = canonical;
        if let Some(record) = self.data.page(&path) {
            if record.toc_path.is_some() {
                // A contents page gets its wrapper, breaking out of the
                // navigation frame.
                target = Some("_top".to_string());
            } else {
                // A page outside the contents tree goes straight to the
                // content pane.
                path = content_page_path(&path);
            }
        }

        let mut href = root_to_doc(&path, doc);
        if let Some(anchor) = anchor {
            href.push_str(anchor);
        }
        Resolved {
            href,
            target,
            class: None,
            changed: true,
        }
    }

    /// Resolve a `JavaScript:ID.Click()` reference through the page's
    /// embedded objects. `None` means the reference is not of that form or
    /// names no help control, and ordinary resolution applies.
    pub fn resolve_click(
        &self,
        reference: &str,
        doc: &str,
        objects: &[ObjectRecord],
        line: u32,
    ) -> Option<Resolved> {
        let captures = CLICK_RE.captures(reference)?;
        let id = captures.get(1).expect("group 1 always captured").as_str();
        let object = objects
            .iter()
            .find(|o| o.attr("id").is_some_and(|v| v.eq_ignore_ascii_case(id)))?;
        if !object.is_help_control() {
            return None;
        }
        self.link_kind(object)?;
        Some(self.deref_object(object, doc, line))
    }

    fn link_kind(&self, object: &ObjectRecord) -> Option<LinkKind> {
        let command = crate::util::fold(object.command()?);
        if command.starts_with("alink") {
            Some(LinkKind::ALink)
        } else if command.starts_with("klink") {
            Some(LinkKind::KLink)
        } else {
            None
        }
    }

    /// Dereference an ALink/KLink help control to the link it stands for.
    pub fn deref_object(&self, object: &ObjectRecord, doc: &str, line: u32) -> Resolved {
        let kind = match self.link_kind(object) {
            Some(kind) => kind,
            None => return self.object_fallback(object, doc, line, "unsupported command"),
        };

        let mut keywords: Vec<String> = object
            .params
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("item2"))
            .map(|(_, v)| v.clone())
            .collect();
        keywords.sort();
        keywords.dedup();

        let mut topics: Vec<Topic> = Vec::new();
        for keyword in &keywords {
            let entry = match kind {
                LinkKind::ALink => self.data.links.alink(keyword),
                LinkKind::KLink => self.data.links.klink(keyword),
            };
            let Some(entry) = entry else { continue };
            collect_topics(&mut topics, entry);
            if entry.topics.is_empty() {
                // See-also entries forward through one level of indirection.
                for target in &entry.see_also {
                    let forwarded = match kind {
                        LinkKind::ALink => self.data.links.alink(target),
                        LinkKind::KLink => self.data.links.klink(target),
                    };
                    if let Some(forwarded) = forwarded {
                        collect_topics(&mut topics, forwarded);
                    }
                }
            }
        }

        match topics.len() {
            0 => self.object_fallback(object, doc, line, "no topics found"),
            1 => match &topics[0] {
                Topic::Local { path, .. } => self.resolve_root_rel(path, None, doc, line),
                Topic::External { url, frame, .. } => Resolved {
                    href: url.clone(),
                    target: (!frame.is_empty()).then(|| frame.clone()),
                    class: None,
                    changed: true,
                },
            },
            _ => {
                let path =
                    self.resolutions
                        .borrow_mut()
                        .page_for(kind, keywords, topics);
                Resolved {
                    href: root_to_doc(&path, doc),
                    target: None,
                    class: Some(MULTI_LINK_CLASS),
                    changed: true,
                }
            }
        }
    }

    fn object_fallback(
        &self,
        object: &ObjectRecord,
        doc: &str,
        line: u32,
        why: &str,
    ) -> Resolved {
        match object.param("DEFAULTTOPIC") {
            Some(fallback) => {
                warn(&format!(
                    "{doc}:{line}: help control: {why}, using default topic"
                ));
                self.resolve(fallback, doc, line)
            }
            None => {
                warn(&format!(
                    "{doc}:{line}: help control: {why} and no default topic"
                ));
                Resolved::broken()
            }
        }
    }
}

fn collect_topics(into: &mut Vec<Topic>, entry: &KeywordEntry) {
    for topic in &entry.topics {
        if !into.contains(topic) {
            into.push(topic.clone());
        }
    }
}

/// `name.ext` → `name.content.ext`; extensionless names gain `.content`.
pub fn content_page_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/{}", content_name(name)),
        None => content_name(path),
    }
}

fn content_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}.content.{ext}"),
        None => format!("{name}.content"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkKind {
    ALink,
    KLink,
}

impl LinkKind {
    pub fn directory(self) -> &'static str {
        match self {
            LinkKind::ALink => "_alinks",
            LinkKind::KLink => "_klinks",
        }
    }
}

/// A resolution page to be emitted: the topics behind one multi-topic
/// keyword lookup.
#[derive(Debug)]
pub struct ResolutionPage {
    pub kind: LinkKind,
    pub path: String,
    pub keywords: Vec<String>,
    pub topics: Vec<Topic>,
}

/// Registered resolution pages, keyed by the distinct sorted keyword
/// sequence so repeated lookups reuse one page.
#[derive(Debug, Default)]
pub struct ResolutionPages {
    by_key: BTreeMap<(LinkKind, Vec<String>), usize>,
    pages: Vec<ResolutionPage>,
    used_slugs: std::collections::BTreeSet<String>,
}

impl ResolutionPages {
    /// Path of the resolution page for `keywords`, registering it on first
    /// use.
    pub fn page_for(
        &mut self,
        kind: LinkKind,
        keywords: Vec<String>,
        topics: Vec<Topic>,
    ) -> String {
        let key = (kind, keywords.clone());
        if let Some(&idx) = self.by_key.get(&key) {
            return self.pages[idx].path.clone();
        }

        let base = sanitise_slug(&keywords.join(" "));
        let mut slug = base.clone();
        let mut n = 0;
        while !self.used_slugs.insert(format!("{:?}/{}", kind, slug)) {
            n += 1;
            slug = format!("{base}.{n}");
        }

        let path = format!("{}/{slug}.html", kind.directory());
        self.by_key.insert(key, self.pages.len());
        self.pages.push(ResolutionPage {
            kind,
            path: path.clone(),
            keywords,
            topics,
        });
        path
    }

    pub fn pages(&self) -> &[ResolutionPage] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Lowercase, collapse runs of non-alphanumerics to `_`, truncate to 48
/// characters. Duplicate disambiguation happens at registration.
pub fn sanitise_slug(text: &str) -> String {
    let mut out = String::new();
    let mut gap = false;
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(c);
        } else {
            gap = true;
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out.chars().take(48).collect()
}
