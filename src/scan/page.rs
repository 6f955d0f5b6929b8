//! Single-page scanning: the worker-side extraction of titles, links,
//! anchors, and embedded objects from one HTML page.

use serde::{Deserialize, Serialize};

use crate::sgml::{self, Attrs, Loc, SgmlHandler};

/// The HTML Help ActiveX control, the only object class the converter
/// understands.
pub const HELP_CONTROL_CLSID: &str = "clsid:adb880a6-d8ff-11cf-9377-00aa003b7a11";

/// Everything extracted from one page.
///
/// `archive` and `toc_path` are stamped by the tree scanner in the parent;
/// the worker fills the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub archive: String,
    /// Root-relative path, canonical case.
    pub path: String,
    /// Child-index path of this page's contents-tree node, when the page
    /// appears in the table of contents.
    pub toc_path: Option<Vec<usize>>,
    pub title: Option<String>,
    pub anchors: Vec<String>,
    pub asset_links: Vec<String>,
    pub page_links: Vec<String>,
    pub objects: Vec<ObjectRecord>,
}

/// An `<object>` element with its byte span, as found in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Attributes in source order with source capitalisation.
    pub attrs: Vec<(String, String)>,
    /// `<param>` name/value pairs in source order.
    pub params: Vec<(String, String)>,
    /// Byte offset of the start tag's `<`.
    pub start: usize,
    /// 1-based line of the start tag.
    pub line: u32,
    /// Total bytes from the start tag through the end of `</object>`.
    pub len: usize,
}

impl ObjectRecord {
    pub fn attr(&self, name: &str) -> Option<&str> {
        lookup(&self.attrs, name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }

    /// Whether this is the HTML Help ActiveX control.
    pub fn is_help_control(&self) -> bool {
        self.attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("application/x-oleobject"))
            && self
                .attr("classid")
                .is_some_and(|c| c.eq_ignore_ascii_case(HELP_CONTROL_CLSID))
    }

    pub fn command(&self) -> Option<&str> {
        self.param("Command")
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Scan one page's bytes. Markup the tokenizer cannot recover from degrades
/// to a partial record plus a warning; it never fails the page outright.
pub fn scan_page(bytes: &[u8], warnings: &mut Vec<String>) -> PageRecord {
    let mut scanner = PageScanner::default();
    if let Err(err) = sgml::parse(bytes, &mut scanner) {
        warnings.push(format!("page only partially scanned: {err}"));
    }
    scanner.finish()
}

#[derive(Default)]
struct PageScanner {
    record: PageRecord,
    title: String,
    in_title: bool,
    current_object: Option<ObjectRecord>,
    object_depth: u32,
}

impl PageScanner {
    fn finish(mut self) -> PageRecord {
        if !self.title.trim().is_empty() && self.record.title.is_none() {
            self.record.title = Some(self.title.trim().to_string());
        }
        self.record
    }

    fn finish_object(&mut self, end: usize) {
        let Some(mut object) = self.current_object.take() else {
            return;
        };
        object.len = end.saturating_sub(object.start);
        // An ALink control's default topic is reachable content: it becomes
        // a discovery root alongside ordinary page links.
        if object.is_help_control()
            && object
                .command()
                .is_some_and(|c| c.to_ascii_lowercase().starts_with("alink"))
        {
            if let Some(topic) = object.param("DEFAULTTOPIC") {
                self.record.page_links.push(topic.to_string());
            }
        }
        self.record.objects.push(object);
    }
}

impl SgmlHandler for PageScanner {
    fn start_element(&mut self, name: &str, attrs: &Attrs, loc: Loc) {
        if sgml::name_is(name, "a") {
            if let Some(href) = attrs.get("href") {
                if !href.starts_with('#') {
                    self.record.page_links.push(href.to_string());
                }
            }
            for key in ["name", "id"] {
                if let Some(anchor) = attrs.get(key) {
                    self.record.anchors.push(anchor.to_string());
                }
            }
        } else if sgml::name_is(name, "img") || sgml::name_is(name, "script") {
            if let Some(src) = attrs.get("src") {
                self.record.asset_links.push(src.to_string());
            }
        } else if sgml::name_is(name, "link") {
            if let Some(href) = attrs.get("href") {
                self.record.asset_links.push(href.to_string());
            }
        } else if sgml::name_is(name, "title") {
            self.in_title = true;
        } else if sgml::name_is(name, "object") {
            if self.current_object.is_some() {
                self.object_depth += 1;
            } else {
                self.current_object = Some(ObjectRecord {
                    attrs: attrs.iter().map(|a| (a.name.clone(), a.value.clone())).collect(),
                    start: loc.offset,
                    line: loc.line,
                    ..ObjectRecord::default()
                });
            }
        } else if sgml::name_is(name, "param") {
            if let Some(object) = self.current_object.as_mut() {
                if let (Some(n), Some(v)) = (attrs.get("name"), attrs.get("value")) {
                    object.params.push((n.to_string(), v.to_string()));
                }
            }
        }
    }

    fn end_element(&mut self, name: &str, loc: Loc) {
        if sgml::name_is(name, "title") {
            self.in_title = false;
        } else if sgml::name_is(name, "object") {
            if self.object_depth > 0 {
                self.object_depth -= 1;
            } else {
                self.finish_object(loc.end);
            }
        }
    }

    fn characters(&mut self, data: &str) {
        if self.in_title {
            self.title.push_str(data);
        }
    }
}
