//! The per-page rewriter and output emission driver.
//!
//! Each scanned page gets a second event walk that builds a splice list:
//! hyperlink and asset references are resolved and substituted in place,
//! embedded HTML Help controls are replaced by plain markup over their full
//! byte span, and the original attribute order and capitalisation are
//! re-emitted so unrelated bytes never change. The rewritten bytes become
//! the `*.content.*` page; a two-frame wrapper takes over the original
//! path.

pub mod nav;
pub mod resolver;
pub mod splice;

use std::path::PathBuf;

use crate::error::Result;
use crate::fs_cache::FsCache;
use crate::rewrite::nav::{escape_attr, escape_text, wrapper_html, Output};
use crate::rewrite::resolver::{content_page_path, Resolved, Resolver};
use crate::rewrite::splice::SpliceList;
use crate::scan::page::{ObjectRecord, PageRecord};
use crate::scan::TreeData;
use crate::sgml::{self, Attrs, Loc, SgmlHandler};
use crate::util::warn;

#[derive(Debug, Default)]
pub struct RewriteOptions {
    pub gzip_pages: bool,
    pub toc_json: Option<PathBuf>,
}

/// Rewrite every page and emit the complete site.
pub fn run(fs: &FsCache, data: &TreeData, options: &RewriteOptions) -> Result<()> {
    let out = Output::new(fs.root(), options.gzip_pages);
    let resolver = Resolver::new(data);

    for record in data.pages.values() {
        let source = match std::fs::read(fs.abs(&record.path)) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn(&format!("cannot reread {}: {err}", record.path));
                continue;
            }
        };
        let rewritten = rewrite_page(&resolver, record, &source);
        out.write_page(&content_page_path(&record.path), &rewritten)?;
        out.write_page(&record.path, wrapper_html(record, &record.path).as_bytes())?;
    }

    nav::write_toc_pages(data, &out)?;
    nav::write_index(data, &out)?;
    let resolutions = resolver.into_resolution_pages();
    nav::write_resolution_pages(data, &resolutions, &out)?;
    if let Some(path) = &options.toc_json {
        nav::write_toc_json(data, path)?;
    }
    Ok(())
}

/// Apply all reference rewrites to one page's bytes.
pub fn rewrite_page(resolver: &Resolver<'_>, record: &PageRecord, source: &[u8]) -> Vec<u8> {
    let mut pass = RewritePass {
        resolver,
        record,
        splices: SpliceList::new(),
        consumed: Vec::new(),
    };

    // Help-control objects are handled span-wise from the page record; the
    // event walk then skips everything inside a consumed span.
    for object in &record.objects {
        if let Some(replacement) = object_replacement(resolver, object, &record.path) {
            pass.splices.push(object.start, object.len, replacement.into_bytes());
            pass.consumed.push((object.start, object.start + object.len));
        }
    }

    if let Err(err) = sgml::parse(source, &mut pass) {
        warn(&format!("{}: page only partially rewritten: {err}", record.path));
    }
    pass.splices.apply(source)
}

/// Replacement markup for an embedded object, or `None` to leave it alone.
///
/// Help controls never survive into output: a `Text` control becomes a
/// plain link, a `Button` control becomes its closest button shape, and
/// anything else (the hidden controls scripts click) is consumed outright.
fn object_replacement(
    resolver: &Resolver<'_>,
    object: &ObjectRecord,
    doc: &str,
) -> Option<String> {
    if !object.is_help_control() {
        return None;
    }
    if let Some(text) = object.param("Text") {
        let label = text
            .split_once(':')
            .filter(|(k, _)| k.eq_ignore_ascii_case("text"))
            .map(|(_, v)| v)
            .unwrap_or(text);
        let resolved = resolver.deref_object(object, doc, object.line);
        Some(link_markup(&resolved, label, None))
    } else if let Some(button) = object.param("Button") {
        let resolved = resolver.deref_object(object, doc, object.line);
        Some(button_markup(button, &resolved))
    } else {
        Some(String::new())
    }
}

fn link_markup(resolved: &Resolved, label: &str, extra_class: Option<&str>) -> String {
    let mut out = format!("<a href=\"{}\"", escape_attr(&resolved.href));
    let class = match (extra_class, resolved.class) {
        (Some(a), Some(b)) => Some(format!("{a} {b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    if let Some(class) = class {
        out.push_str(&format!(" class=\"{}\"", escape_attr(&class)));
    }
    if let Some(target) = &resolved.target {
        out.push_str(&format!(" target=\"{}\"", escape_attr(target)));
    }
    out.push('>');
    out.push_str(&escape_text(label));
    out.push_str("</a>");
    out
}

/// Button shapes are cosmetic; the object span must go regardless. A text
/// button keeps its label, the graphical kinds collapse to a marker glyph.
fn button_markup(value: &str, resolved: &Resolved) -> String {
    let label = match value.split_once(':') {
        Some((kind, rest)) if kind.eq_ignore_ascii_case("text") => rest.trim().to_string(),
        _ => "?".to_string(),
    };
    link_markup(resolved, &label, Some("chmweb-button"))
}

struct RewritePass<'a> {
    resolver: &'a Resolver<'a>,
    record: &'a PageRecord,
    splices: SpliceList,
    /// Byte spans of objects already replaced wholesale.
    consumed: Vec<(usize, usize)>,
}

impl RewritePass<'_> {
    fn in_consumed(&self, offset: usize) -> bool {
        self.consumed
            .iter()
            .any(|&(start, end)| offset >= start && offset < end)
    }

    fn rewrite_reference(&mut self, attrs: &Attrs, attr_name: &str, name: &str, loc: Loc) {
        let Some(value) = attrs.get(attr_name) else {
            return;
        };
        let doc = &self.record.path;
        let resolved = if sgml::name_is(name, "a") {
            self.resolver
                .resolve_click(value, doc, &self.record.objects, loc.line)
                .unwrap_or_else(|| self.resolver.resolve(value, doc, loc.line))
        } else {
            self.resolver.resolve(value, doc, loc.line)
        };

        // Frame targets only make sense on anchors.
        let wants_target = sgml::name_is(name, "a");
        let has_target = attrs.has("target");
        let needed = if wants_target {
            resolved.needs_rewrite(has_target)
        } else {
            resolved.changed
        };
        if !needed {
            return;
        }

        let tag = rebuild_tag(name, attrs, attr_name, &resolved, wants_target);
        self.splices.push(loc.offset, loc.end - loc.offset, tag.into_bytes());
    }
}

/// Re-emit a start tag with one attribute value replaced, keeping attribute
/// order and capitalisation so diffs stay minimal.
fn rebuild_tag(
    name: &str,
    attrs: &Attrs,
    replace: &str,
    resolved: &Resolved,
    wants_target: bool,
) -> String {
    let mut out = format!("<{name}");
    let mut had_class = false;
    let mut had_target = false;
    for attr in attrs.iter() {
        let mut value = attr.value.clone();
        if attr.name.eq_ignore_ascii_case(replace) {
            value = resolved.href.clone();
        } else if attr.name.eq_ignore_ascii_case("class") {
            had_class = true;
            if let Some(class) = resolved.class {
                value = format!("{value} {class}");
            }
        } else if attr.name.eq_ignore_ascii_case("target") {
            had_target = true;
        }
        out.push_str(&format!(" {}=\"{}\"", attr.name, escape_attr(&value)));
    }
    if !had_class {
        if let Some(class) = resolved.class {
            out.push_str(&format!(" class=\"{class}\""));
        }
    }
    if wants_target && !had_target {
        if let Some(target) = &resolved.target {
            out.push_str(&format!(" target=\"{}\"", escape_attr(target)));
        }
    }
    out.push('>');
    out
}

impl SgmlHandler for RewritePass<'_> {
    fn start_element(&mut self, name: &str, attrs: &Attrs, loc: Loc) {
        if self.in_consumed(loc.offset) {
            return;
        }
        if sgml::name_is(name, "a") || sgml::name_is(name, "link") {
            self.rewrite_reference(attrs, "href", name, loc);
        } else if sgml::name_is(name, "img") || sgml::name_is(name, "script") {
            self.rewrite_reference(attrs, "src", name, loc);
        }
    }
}
