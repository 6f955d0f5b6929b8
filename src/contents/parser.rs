//! Parsers for per-archive HHC contents files and collection COL files.
//!
//! Both are pseudo-HTML. An HHC nests `<ul>`/`<li>` with `<param>` children
//! (usually wrapped in a sitemap `<object>`) carrying `Name`/`Local` fields.
//! A COL nests `Folder` elements with `TitleString`/`FolderOrder` children;
//! a title starting with `=` names an archive.
//!
//! HHC sources frequently close an `<li>` before opening the child `<ul>`.
//! The items of such a `<ul>` fold into the preceding sibling item; when no
//! preceding sibling exists at all the anonymous node is kept, empty — the
//! behaviour help viewers exhibit on these files, pinned by tests below.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sgml::{self, Attrs, Loc, SgmlHandler};

/// One contents entry: a folder (no `local`), a page, or an anonymous
/// wrapper (neither field). Serialisable so HHC parsing can run in a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentsItem {
    pub name: Option<String>,
    pub local: Option<String>,
    pub children: Vec<ContentsItem>,
}

/// Parse an HHC byte buffer into its top-level items.
pub fn parse_hhc(bytes: &[u8]) -> Result<Vec<ContentsItem>> {
    let mut handler = HhcHandler {
        levels: vec![Vec::new()],
    };
    sgml::parse(bytes, &mut handler)?;
    // Unclosed <ul> levels collapse outward the same way closed ones do.
    while handler.levels.len() > 1 {
        handler.close_level();
    }
    Ok(handler.levels.pop().unwrap_or_default())
}

struct HhcHandler {
    /// One vec of items per open `<ul>`; index 0 is the document top level.
    levels: Vec<Vec<ContentsItem>>,
}

impl HhcHandler {
    fn close_level(&mut self) {
        let items = self.levels.pop().unwrap_or_default();
        if self.levels.is_empty() {
            self.levels.push(items);
            return;
        }
        if self.levels.len() == 1 {
            // The outermost <ul> contributes roots directly.
            self.levels[0].extend(items);
            return;
        }
        let level = self.levels.last_mut().expect("at least one nested level");
        if let Some(prev) = level.last_mut() {
            prev.children.extend(items);
        } else {
            level.push(ContentsItem {
                name: None,
                local: None,
                children: items,
            });
        }
    }
}

impl SgmlHandler for HhcHandler {
    fn start_element(&mut self, name: &str, attrs: &Attrs, _loc: Loc) {
        if sgml::name_is(name, "ul") {
            self.levels.push(Vec::new());
        } else if sgml::name_is(name, "li") {
            if let Some(level) = self.levels.last_mut() {
                level.push(ContentsItem::default());
            }
        } else if sgml::name_is(name, "param") {
            let (Some(pname), Some(value)) = (attrs.get("name"), attrs.get("value")) else {
                return;
            };
            let Some(item) = self.levels.last_mut().and_then(|l| l.last_mut()) else {
                return;
            };
            if pname.eq_ignore_ascii_case("name") {
                if item.name.is_none() {
                    item.name = Some(value.to_string());
                }
            } else if pname.eq_ignore_ascii_case("local") {
                if item.local.is_none() {
                    item.local = Some(value.replace('\\', "/"));
                }
            }
        }
    }

    fn end_element(&mut self, name: &str, _loc: Loc) {
        if sgml::name_is(name, "ul") && self.levels.len() > 1 {
            self.close_level();
        }
    }
}

/// A collection folder parsed from a COL file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColFolder {
    pub title: String,
    pub order: Option<u32>,
    pub children: Vec<ColFolder>,
}

impl ColFolder {
    /// The archive stem this folder names, if its title carries the `=`
    /// prefix.
    pub fn archive_stem(&self) -> Option<&str> {
        self.title.strip_prefix('=')
    }
}

/// Parse a COL byte buffer into its top-level folders, each level ordered
/// by `FolderOrder`.
pub fn parse_col(bytes: &[u8]) -> Result<Vec<ColFolder>> {
    let mut handler = ColHandler {
        stack: Vec::new(),
        roots: Vec::new(),
        capture: None,
        text: String::new(),
    };
    sgml::parse(bytes, &mut handler)?;
    let mut roots = handler.roots;
    sort_folders(&mut roots);
    Ok(roots)
}

fn sort_folders(folders: &mut Vec<ColFolder>) {
    folders.sort_by_key(|f| f.order.unwrap_or(u32::MAX));
    for f in folders {
        sort_folders(&mut f.children);
    }
}

#[derive(Clone, Copy)]
enum ColField {
    Title,
    Order,
}

struct ColHandler {
    stack: Vec<ColFolder>,
    roots: Vec<ColFolder>,
    capture: Option<ColField>,
    text: String,
}

impl SgmlHandler for ColHandler {
    fn start_element(&mut self, name: &str, _attrs: &Attrs, _loc: Loc) {
        if sgml::name_is(name, "folder") {
            self.stack.push(ColFolder::default());
        } else if sgml::name_is(name, "titlestring") {
            self.capture = Some(ColField::Title);
            self.text.clear();
        } else if sgml::name_is(name, "folderorder") {
            self.capture = Some(ColField::Order);
            self.text.clear();
        }
    }

    fn end_element(&mut self, name: &str, _loc: Loc) {
        if sgml::name_is(name, "folder") {
            if let Some(done) = self.stack.pop() {
                match self.stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => self.roots.push(done),
                }
            }
        } else if sgml::name_is(name, "titlestring") || sgml::name_is(name, "folderorder") {
            if let (Some(field), Some(folder)) = (self.capture.take(), self.stack.last_mut()) {
                match field {
                    ColField::Title => folder.title = self.text.trim().to_string(),
                    ColField::Order => folder.order = self.text.trim().parse().ok(),
                }
            }
        }
    }

    fn characters(&mut self, data: &str) {
        if self.capture.is_some() {
            self.text.push_str(data);
        }
    }
}
