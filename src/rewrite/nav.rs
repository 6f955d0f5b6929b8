//! Emission of the generated site furniture: `_toc` contents panes,
//! two-frame wrapper pages, resolution pages, `index.html`, and the
//! optional TOC JSON dump.

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::chm::Topic;
use crate::contents::{ContentsTree, NodeData, NodeId};
use crate::error::Result;
use crate::path::root_to_doc;
use crate::rewrite::resolver::{content_page_path, ResolutionPages};
use crate::scan::page::PageRecord;
use crate::scan::TreeData;
use crate::util::warn;

/// Sink for every generated file. With gzip enabled, pages are written as
/// `*.gz` and any plain original at the same path is removed.
pub struct Output {
    root: PathBuf,
    gzip: bool,
    written: RefCell<Vec<String>>,
}

impl Output {
    pub fn new(root: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            root: root.into(),
            gzip,
            written: RefCell::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative logical paths of everything written so far.
    pub fn written(&self) -> Vec<String> {
        self.written.borrow().clone()
    }

    pub fn write_page(&self, root_rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(root_rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.gzip {
            let file = std::fs::File::create(path.with_extension(gz_extension(&path)))?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?;
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        } else {
            std::fs::write(&path, bytes)?;
        }
        self.written.borrow_mut().push(root_rel.to_string());
        Ok(())
    }
}

fn gz_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.gz"),
        None => "gz".to_string(),
    }
}

/// Minimal HTML text escaping.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Escaping for double-quoted attribute values.
pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// File name of the contents pane for the container at `path`.
pub fn toc_page_name(path: &[usize]) -> String {
    if path.is_empty() {
        "toc.html".to_string()
    } else {
        let joined: Vec<String> = path.iter().map(usize::to_string).collect();
        format!("toc{}.html", joined.join("_"))
    }
}

/// Anchor name of the node at `path` inside a contents pane.
pub fn node_anchor(path: &[usize]) -> String {
    let mut out = String::from("n");
    for (i, seg) in path.iter().enumerate() {
        if i > 0 {
            out.push('_');
        }
        out.push_str(&seg.to_string());
    }
    out
}

const TOC_STYLE: &str = "body{font-family:sans-serif;font-size:10pt;margin:4px}\
ul{list-style:none;padding-left:1.2em;margin:2px 0}\
a{text-decoration:none}a.chmweb-folder{font-weight:bold}\
li.chmweb-here>a{background:#cde}";

/// Emit one contents pane per interior container, plus the root pane.
pub fn write_toc_pages(data: &TreeData, out: &Output) -> Result<()> {
    let tree = &data.tree;
    let mut containers: Vec<NodeId> = vec![tree.root()];
    tree.walk(tree.root(), &mut |t, id| {
        if id != t.root() && !t.children(id).is_empty() {
            containers.push(id);
        }
    });

    for id in containers {
        let path = tree.path(id).expect("containers are attached");
        let mut body = String::new();
        render_level(data, tree.root(), &path, &mut body);
        let html = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
<title>Contents</title><style>{TOC_STYLE}</style></head>\n\
<body>\n{body}</body></html>\n"
        );
        out.write_page(&format!("_toc/{}", toc_page_name(&path)), html.as_bytes())?;
    }
    Ok(())
}

/// Render one `<ul>` level, expanding containers along `open_path`.
fn render_level(data: &TreeData, node: NodeId, open_path: &[usize], body: &mut String) {
    let tree = &data.tree;
    body.push_str("<ul>\n");
    for &child in tree.children(node) {
        let child_path = tree.path(child).expect("attached");
        let anchor = node_anchor(&child_path);
        let on_path = open_path.starts_with(&child_path);
        let here = child_path == open_path;
        let class = if here { " class=\"chmweb-here\"" } else { "" };

        match tree.data(child) {
            NodeData::Page { title, filename, anchor: page_anchor, .. } => {
                let mut href = root_to_doc(filename, "_toc/x.html");
                if let Some(a) = page_anchor {
                    href.push('#');
                    href.push_str(a);
                }
                body.push_str(&format!(
                    "<li id=\"{anchor}\"{class}><a href=\"{}\" target=\"_top\">{}</a>",
                    escape_attr(&href),
                    escape_text(title)
                ));
            }
            NodeData::Folder { title } => {
                // Collapsed folders link to their own pane; the expanded
                // chain links upward so a click collapses it again.
                let own = toc_page_name(&child_path);
                let link_path = if on_path {
                    toc_page_name(&child_path[..child_path.len() - 1])
                } else {
                    own
                };
                body.push_str(&format!(
                    "<li id=\"{anchor}\"{class}><a class=\"chmweb-folder\" href=\"{}#{anchor}\">{}</a>",
                    escape_attr(&link_path),
                    escape_text(title)
                ));
            }
            NodeData::ArchiveRef { stem } => {
                // Placeholders that survived discovery are archives whose
                // contents never parsed; show them inert.
                body.push_str(&format!(
                    "<li id=\"{anchor}\"{class}>{}",
                    escape_text(stem)
                ));
            }
            NodeData::Root => {}
        }

        if on_path && !tree.children(child).is_empty() {
            body.push('\n');
            render_level(data, child, open_path, body);
        }
        body.push_str("</li>\n");
    }
    body.push_str("</ul>\n");
}

/// The two-frame wrapper for `record`, emitted at root-relative `at`
/// (normally the page's own path; `index.html` for the site entry point).
pub fn wrapper_html(record: &PageRecord, at: &str) -> String {
    let title = record
        .title
        .clone()
        .unwrap_or_else(|| record.path.clone());

    let toc_rel = match &record.toc_path {
        Some(path) => {
            let pane = toc_page_name(&path[..path.len().saturating_sub(1)]);
            format!(
                "{}#{}",
                root_to_doc(&format!("_toc/{pane}"), at),
                node_anchor(path)
            )
        }
        None => root_to_doc("_toc/toc.html", at),
    };
    let content_rel = root_to_doc(&content_page_path(&record.path), at);

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n\
<frameset cols=\"280,*\">\n\
<frame name=\"contents\" src=\"{}\">\n\
<frame name=\"content\" src=\"{}\">\n\
<noframes><body><a href=\"{}\">{}</a></body></noframes>\n\
</frameset></html>\n",
        escape_text(&title),
        escape_attr(&toc_rel),
        escape_attr(&content_rel),
        escape_attr(&content_rel),
        escape_text(&title)
    )
}

/// `index.html`: the wrapper for the first discoverable contents leaf.
pub fn write_index(data: &TreeData, out: &Output) -> Result<()> {
    let Some(first) = data.tree.first_page() else {
        warn("contents tree has no pages; index.html not written");
        return Ok(());
    };
    let NodeData::Page { filename, .. } = data.tree.data(first) else {
        unreachable!("first_page returns pages");
    };
    let Some(record) = data.page(filename) else {
        warn(&format!("first contents page {filename:?} was never scanned"));
        return Ok(());
    };
    let html = wrapper_html(record, "index.html");
    out.write_page("index.html", html.as_bytes())
}

/// Emit every registered `_alinks`/`_klinks` resolution page.
pub fn write_resolution_pages(
    data: &TreeData,
    pages: &ResolutionPages,
    out: &Output,
) -> Result<()> {
    for page in pages.pages() {
        let title = page.keywords.join(", ");
        let mut items = String::new();
        for topic in &page.topics {
            let (href, label) = match topic {
                Topic::Local { path, .. } => {
                    let canonical = data
                        .lookup_link(path)
                        .map(String::from)
                        .unwrap_or_else(|| path.clone());
                    let target = match data.page(&canonical) {
                        Some(rec) if rec.toc_path.is_none() => content_page_path(&canonical),
                        _ => canonical,
                    };
                    (root_to_doc(&target, &page.path), topic.display().to_string())
                }
                Topic::External { url, .. } => (url.clone(), topic.display().to_string()),
            };
            items.push_str(&format!(
                "<li><a href=\"{}\" target=\"_top\">{}</a></li>\n",
                escape_attr(&href),
                escape_text(&label)
            ));
        }
        let html = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n\
<body>\n<h1>{}</h1>\n<ul>\n{items}</ul>\n</body></html>\n",
            escape_text(&title),
            escape_text(&title)
        );
        out.write_page(&page.path, html.as_bytes())?;
    }
    Ok(())
}

#[derive(Serialize)]
struct TocJsonNode {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<TocJsonNode>>,
}

/// Write the contents tree as JSON: an array of `{title, path?, children?}`
/// mirroring the tree, UTF-8 without BOM.
pub fn write_toc_json(data: &TreeData, path: &Path) -> Result<()> {
    fn convert(tree: &ContentsTree, id: NodeId) -> TocJsonNode {
        let (title, path) = match tree.data(id) {
            NodeData::Page { title, filename, .. } => (title.clone(), Some(filename.clone())),
            NodeData::Folder { title } => (title.clone(), None),
            NodeData::ArchiveRef { stem } => (stem.clone(), None),
            NodeData::Root => (String::new(), None),
        };
        let children: Vec<TocJsonNode> = tree
            .children(id)
            .iter()
            .map(|&c| convert(tree, c))
            .collect();
        TocJsonNode {
            title,
            path,
            children: (!children.is_empty()).then_some(children),
        }
    }

    let roots: Vec<TocJsonNode> = data
        .tree
        .children(data.tree.root())
        .iter()
        .map(|&c| convert(&data.tree, c))
        .collect();
    let json = serde_json::to_vec_pretty(&roots)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_names_and_anchors() {
        assert_eq!(toc_page_name(&[]), "toc.html");
        assert_eq!(toc_page_name(&[3, 1, 2]), "toc3_1_2.html");
        assert_eq!(node_anchor(&[]), "n");
        assert_eq!(node_anchor(&[3, 1, 2]), "n3_1_2");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a<b>&c"), "a&lt;b&gt;&amp;c");
        assert_eq!(escape_attr("x\"y"), "x&quot;y");
    }

    #[test]
    fn gzip_output_replaces_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.htm"), b"old").unwrap();
        let out = Output::new(dir.path(), true);
        out.write_page("p.htm", b"new").unwrap();
        assert!(!dir.path().join("p.htm").exists());
        assert!(dir.path().join("p.htm.gz").exists());
        assert_eq!(out.written(), vec!["p.htm"]);
    }

    #[test]
    fn plain_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let out = Output::new(dir.path(), false);
        out.write_page("_toc/toc.html", b"x").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("_toc/toc.html")).unwrap(),
            b"x"
        );
    }
}
