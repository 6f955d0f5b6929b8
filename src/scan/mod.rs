//! Discovery: contents parsing, the reachable-page fixed point, and the
//! aggregate [`TreeData`] everything downstream reads.
//!
//! The scanner owns the only mutable phase of the pipeline. It replaces
//! archive placeholders with parsed contents subtrees, then drives the page
//! scanner over every reachable page until the pending set is empty. The
//! universe of root-relative paths under the output directory is finite and
//! each scan is dispatched at most once per case-folded path, so the fixed
//! point terminates.

pub mod page;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::rc::Rc;

use crate::chm::AkLinkTable;
use crate::contents::parser::ContentsItem;
use crate::contents::{ContentsTree, NodeData, NodeId};
use crate::error::Result;
use crate::fs_cache::FsCache;
use crate::path::{doc_to_root, resolve_mixed_case};
use crate::pool::worker::{Job, JobResult};
use crate::pool::WorkerPool;
use crate::registry::{join_subdir, parse_its_ref, ArchiveRegistry};
use crate::scan::page::PageRecord;
use crate::util::{fold, split_anchor, warn};

/// Extensions treated as scannable pages; anything else reachable through a
/// hyperlink is carried as an asset.
const PAGE_EXTENSIONS: [&str; 4] = ["htm", "html", "shtml", "stm"];

/// The frozen result of discovery.
#[derive(Debug)]
pub struct TreeData {
    pub registry: ArchiveRegistry,
    pub tree: ContentsTree,
    pub links: AkLinkTable,
    /// Scanned pages keyed by case-folded canonical root-relative path.
    pub pages: BTreeMap<String, PageRecord>,
    /// Root-relative asset references, case-folded, as discovered.
    pub assets: BTreeSet<String>,
    /// Case-folded root-relative path → canonically-cased filesystem path,
    /// for every page and asset that exists on disk.
    pub link_map: BTreeMap<String, String>,
}

impl TreeData {
    pub fn page(&self, root_rel: &str) -> Option<&PageRecord> {
        self.pages.get(&fold(root_rel))
    }

    pub fn lookup_link(&self, root_rel: &str) -> Option<&str> {
        self.link_map.get(&fold(root_rel)).map(String::as_str)
    }
}

/// Run discovery to completion.
pub fn scan(
    fs: &FsCache,
    pool: &mut WorkerPool<Job, JobResult>,
    registry: ArchiveRegistry,
    mut tree: ContentsTree,
    links: AkLinkTable,
) -> Result<TreeData> {
    let mut pending: VecDeque<String> = links.local_seed_paths().into();
    replace_placeholders(fs, pool, &registry, &mut tree, &mut pending)?;

    let (pages, assets) = fixed_point(fs, pool, &registry, pending)?;

    let mut data = TreeData {
        registry,
        tree,
        links,
        pages,
        assets,
        link_map: BTreeMap::new(),
    };
    stamp_toc_paths(&mut data);
    build_link_map(fs, &mut data);
    Ok(data)
}

/// Parse every placeholder's HHC through the pool and splice the resulting
/// subtrees into the contents tree, queueing each new page for scanning.
fn replace_placeholders(
    fs: &FsCache,
    pool: &mut WorkerPool<Job, JobResult>,
    registry: &ArchiveRegistry,
    tree: &mut ContentsTree,
    pending: &mut VecDeque<String>,
) -> Result<()> {
    let parsed: Rc<RefCell<Vec<(NodeId, String, Vec<ContentsItem>)>>> =
        Rc::new(RefCell::new(Vec::new()));

    for (node, stem) in tree.archive_refs() {
        let Some(subdir) = registry.subdir_by_stem(&stem).map(String::from) else {
            warn(&format!("contents names unknown archive {stem:?}"));
            tree.replace(node, &[]);
            continue;
        };
        let Some(hhc) = find_hhc(fs, &subdir) else {
            warn(&format!("archive {stem:?} has no contents (.hhc) file"));
            tree.replace(node, &[]);
            continue;
        };
        let parsed = Rc::clone(&parsed);
        pool.submit(
            &Job::ParseContents {
                path: fs.abs(&hhc),
            },
            move |result| {
                if let JobResult::Contents(items) = result {
                    parsed.borrow_mut().push((node, subdir, items));
                }
            },
        )?;
    }
    pool.drain()?;

    for (node, subdir, items) in parsed.take() {
        let replacements: Vec<NodeId> = items
            .iter()
            .map(|item| build_subtree(fs, tree, item, &subdir, pending))
            .collect();
        tree.replace(node, &replacements);
    }
    Ok(())
}

/// Convert one parsed contents item into detached tree nodes, canonicalising
/// page paths and queueing them for the fixed point.
fn build_subtree(
    fs: &FsCache,
    tree: &mut ContentsTree,
    item: &ContentsItem,
    subdir: &str,
    pending: &mut VecDeque<String>,
) -> NodeId {
    let title = item.name.clone().unwrap_or_default();
    let data = match &item.local {
        Some(local) => {
            let (local, anchor) = split_anchor(local);
            let joined = join_subdir(subdir, local);
            let filename = match resolve_mixed_case(fs, &joined, "") {
                Some(canonical) => canonical,
                None => {
                    warn(&format!("contents page {joined:?} not found on disk"));
                    joined
                }
            };
            pending.push_back(filename.clone());
            NodeData::Page {
                title,
                filename,
                anchor: anchor.map(|a| a.trim_start_matches('#').to_string()),
            }
        }
        None => NodeData::Folder { title },
    };
    let id = tree.alloc(data);
    for child in &item.children {
        let child_id = build_subtree(fs, tree, child, subdir, pending);
        tree.append(id, child_id);
    }
    id
}

/// Locate an archive's HHC file inside its extracted subdirectory.
fn find_hhc(fs: &FsCache, subdir: &str) -> Option<String> {
    let mut candidates: Vec<String> = fs
        .children(subdir)
        .iter()
        .filter(|name| fold(name).ends_with(".hhc"))
        .cloned()
        .collect();
    candidates.sort();
    let name = candidates.into_iter().next()?;
    Some(join_subdir(subdir, &name))
}

/// Drive the page scanner until nothing reachable remains unscanned.
fn fixed_point(
    fs: &FsCache,
    pool: &mut WorkerPool<Job, JobResult>,
    registry: &ArchiveRegistry,
    mut pending: VecDeque<String>,
) -> Result<(BTreeMap<String, PageRecord>, BTreeSet<String>)> {
    let mut pages: BTreeMap<String, PageRecord> = BTreeMap::new();
    let mut assets: BTreeSet<String> = BTreeSet::new();
    let mut seen: HashSet<String> = HashSet::new();

    let results: Rc<RefCell<Vec<(String, PageRecord)>>> = Rc::new(RefCell::new(Vec::new()));
    let outstanding = Rc::new(Cell::new(0usize));

    loop {
        while let Some(raw) = pending.pop_front() {
            if !seen.insert(fold(&raw)) {
                continue;
            }
            let Some(canonical) = resolve_mixed_case(fs, &raw, "") else {
                // Scanning a missing page is pointless; the reference will
                // warn as broken when rewritten.
                continue;
            };
            // The canonical spelling counts as seen too.
            seen.insert(fold(&canonical));
            let results = Rc::clone(&results);
            let outstanding = Rc::clone(&outstanding);
            outstanding.set(outstanding.get() + 1);
            pool.submit(
                &Job::ScanPage {
                    path: fs.abs(&canonical),
                },
                move |result| {
                    outstanding.set(outstanding.get() - 1);
                    if let JobResult::Page(record) = result {
                        results.borrow_mut().push((canonical, record));
                    }
                },
            )?;
        }

        if results.borrow().is_empty() {
            if outstanding.get() == 0 {
                break;
            }
            pool.drain()?;
        }

        for (canonical, mut record) in results.take() {
            let owner = registry.owner_of(&canonical);
            let subdir = owner.map(|e| e.subdir.clone()).unwrap_or_default();
            record.archive = owner.map(|e| e.stem.clone()).unwrap_or_default();

            for link in &record.asset_links {
                if let Some(target) = discovery_target(link, &canonical, &subdir, registry) {
                    assets.insert(fold(&target));
                }
            }
            for link in &record.page_links {
                if let Some(target) = discovery_target(link, &canonical, &subdir, registry) {
                    if is_page_path(&target) {
                        pending.push_back(target);
                    } else {
                        assets.insert(fold(&target));
                    }
                }
            }
            record.path = canonical.clone();
            pages.insert(fold(&canonical), record);
        }
    }
    Ok((pages, assets))
}

/// Root-relative form of a reference for discovery purposes, or `None` when
/// it leads outside the tree (anchors, external schemes, unknown archives,
/// root escapes). Warnings wait until rewriting so each problem is reported
/// once, with its page and line.
pub fn discovery_target(
    reference: &str,
    doc: &str,
    doc_subdir: &str,
    registry: &ArchiveRegistry,
) -> Option<String> {
    if reference.starts_with('#') {
        return None;
    }
    if let Some((archive, url)) = parse_its_ref(reference) {
        let subdir = registry.subdir_by_stem(archive)?;
        let (path, _) = split_anchor(url);
        return Some(join_subdir(subdir, path));
    }
    if has_scheme(reference) {
        return None;
    }
    let (path, _) = split_anchor(reference);
    if path.is_empty() {
        return None;
    }
    if let Some(abs) = path.strip_prefix('/') {
        return Some(join_subdir(doc_subdir, abs));
    }
    doc_to_root(path, doc)
}

/// Whether a reference starts with a URL scheme (step 3 of resolution).
pub fn has_scheme(reference: &str) -> bool {
    let mut chars = reference.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for c in chars {
        if c == ':' {
            return true;
        }
        if !c.is_ascii_alphanumeric() {
            return false;
        }
    }
    false
}

fn is_page_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, ext)) => PAGE_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)),
        None => false,
    }
}

/// Stamp each contents-tree page's path into its page record.
fn stamp_toc_paths(data: &mut TreeData) {
    let mut stamps: Vec<(String, Vec<usize>)> = Vec::new();
    data.tree.walk(data.tree.root(), &mut |tree, id| {
        if let NodeData::Page { filename, .. } = tree.data(id) {
            if let Some(path) = tree.path(id) {
                stamps.push((fold(filename), path));
            }
        }
    });
    for (key, path) in stamps {
        if let Some(record) = data.pages.get_mut(&key) {
            if record.toc_path.is_none() {
                record.toc_path = Some(path);
            }
        }
    }
}

/// Resolve every discovered page and asset to its on-disk case.
fn build_link_map(fs: &FsCache, data: &mut TreeData) {
    for (key, record) in &data.pages {
        data.link_map.insert(key.clone(), record.path.clone());
    }
    for asset in &data.assets {
        if let Some(canonical) = resolve_mixed_case(fs, asset, "") {
            data.link_map.insert(asset.clone(), canonical);
        }
    }
}
