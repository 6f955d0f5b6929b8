//! End-to-end discovery and rewriting over a real directory tree, driving
//! actual worker processes (this binary with the hidden worker flag).

use std::process::Command;

use chmweb::chm::AkLinkTable;
use chmweb::contents::{ContentsTree, NodeData};
use chmweb::fs_cache::FsCache;
use chmweb::pool::worker::{Job, JobResult};
use chmweb::pool::WorkerPool;
use chmweb::registry::ArchiveRegistry;
use chmweb::rewrite::{self, RewriteOptions};
use chmweb::scan;
use tempfile::TempDir;

fn worker_pool(count: usize) -> WorkerPool<Job, JobResult> {
    WorkerPool::spawn(count, || {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_chmweb"));
        cmd.arg("--worker");
        cmd
    })
    .expect("spawn workers")
}

/// An extracted single-archive site with mixed-case cross references.
fn build_site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("html")).unwrap();

    std::fs::write(
        root.join("contents.hhc"),
        br#"<HTML><BODY><UL>
 <LI><OBJECT type="text/sitemap">
   <param name="Name" value="Page One">
   <param name="Local" value="html\Page1.htm">
 </OBJECT>
</UL></BODY></HTML>"#,
    )
    .unwrap();

    std::fs::write(
        root.join("html/page1.htm"),
        br#"<html><head><title>Page One</title></head><body>
<a href="PAGE2.HTM">next</a>
<img src="/HTML/PIC.GIF">
</body></html>"#,
    )
    .unwrap();

    std::fs::write(
        root.join("html/Page2.htm"),
        br#"<html><head><title>Page Two</title></head><body>
<a href="page1.htm">back</a>
</body></html>"#,
    )
    .unwrap();

    std::fs::write(root.join("html/pic.gif"), b"GIF89a").unwrap();
    dir
}

#[test]
fn discovery_and_rewrite_round_trip() {
    let site = build_site();
    let fs = FsCache::new(site.path());

    let mut registry = ArchiveRegistry::new();
    registry.register("base", "").unwrap();
    let mut tree = ContentsTree::new();
    let root = tree.root();
    let placeholder = tree.alloc(NodeData::ArchiveRef {
        stem: "base".into(),
    });
    tree.append(root, placeholder);

    let mut pool = worker_pool(2);
    let data = scan::scan(&fs, &mut pool, registry, tree, AkLinkTable::new()).unwrap();
    pool.shutdown().unwrap();

    // Discovery closure: page2 is reachable only through page1's link.
    assert!(data.pages.contains_key("html/page1.htm"));
    assert!(data.pages.contains_key("html/page2.htm"));
    assert!(data.assets.contains("html/pic.gif"));

    // Canonical casing came from disk, not from the references.
    assert_eq!(data.lookup_link("HTML/PAGE2.HTM"), Some("html/Page2.htm"));
    assert_eq!(data.lookup_link("HTML/PIC.GIF"), Some("html/pic.gif"));

    // The HHC page carries its contents-tree path.
    let page1 = data.page("html/page1.htm").unwrap();
    assert_eq!(page1.toc_path, Some(vec![0]));
    assert_eq!(page1.title.as_deref(), Some("Page One"));
    assert!(data.page("html/Page2.htm").unwrap().toc_path.is_none());

    let toc_json = site.path().join("toc.json");
    let options = RewriteOptions {
        gzip_pages: false,
        toc_json: Some(toc_json.clone()),
    };
    rewrite::run(&fs, &data, &options).unwrap();

    // Content page: rewritten links, canonical case, content infix for the
    // page outside the contents tree.
    let content =
        std::fs::read_to_string(site.path().join("html/page1.content.htm")).unwrap();
    assert!(content.contains("href=\"Page2.content.htm\""), "{content}");
    assert!(content.contains("src=\"pic.gif\""), "{content}");

    // Wrapper took over the original path.
    let wrapper = std::fs::read_to_string(site.path().join("html/page1.htm")).unwrap();
    assert!(wrapper.contains("<frameset"), "{wrapper}");
    assert!(wrapper.contains("page1.content.htm"), "{wrapper}");
    assert!(wrapper.contains("../_toc/toc.html#n0"), "{wrapper}");

    // Page2 links back to a contents page: _top target.
    let content2 =
        std::fs::read_to_string(site.path().join("html/Page2.content.htm")).unwrap();
    assert!(
        content2.contains("href=\"page1.htm\" target=\"_top\""),
        "{content2}"
    );

    // Navigation pane and index.
    let toc = std::fs::read_to_string(site.path().join("_toc/toc.html")).unwrap();
    assert!(toc.contains("Page One"));
    assert!(toc.contains("target=\"_top\""));
    let index = std::fs::read_to_string(site.path().join("index.html")).unwrap();
    assert!(index.contains("html/page1.content.htm"), "{index}");
    assert!(index.contains("_toc/toc.html#n0"), "{index}");

    // TOC JSON mirrors the tree.
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&toc_json).unwrap()).unwrap();
    assert_eq!(json[0]["title"], "Page One");
    assert_eq!(json[0]["path"], "html/page1.htm");
}

#[test]
fn gzip_run_replaces_generated_pages() {
    let site = build_site();
    let fs = FsCache::new(site.path());

    let mut registry = ArchiveRegistry::new();
    registry.register("base", "").unwrap();
    let mut tree = ContentsTree::new();
    let root = tree.root();
    let placeholder = tree.alloc(NodeData::ArchiveRef {
        stem: "base".into(),
    });
    tree.append(root, placeholder);

    let mut pool = worker_pool(1);
    let data = scan::scan(&fs, &mut pool, registry, tree, AkLinkTable::new()).unwrap();
    pool.shutdown().unwrap();

    let options = RewriteOptions {
        gzip_pages: true,
        toc_json: None,
    };
    rewrite::run(&fs, &data, &options).unwrap();

    assert!(site.path().join("html/page1.htm.gz").exists());
    assert!(!site.path().join("html/page1.htm").exists());
    assert!(site.path().join("html/page1.content.htm.gz").exists());
    assert!(site.path().join("_toc/toc.html.gz").exists());
    // Assets are not pages; they stay as extracted.
    assert!(site.path().join("html/pic.gif").exists());
}
