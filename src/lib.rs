//! # chmweb
//!
//! Convert Microsoft Compiled HTML Help archives into standalone static
//! websites that keep the original table of contents, cross-document links,
//! context-sensitive ALink/KLink lookups, and embedded navigation controls,
//! while depending on nothing beyond a plain web browser.
//!
//! ## Pipeline
//!
//! 1. Archives are unpacked by an external extractor process.
//! 2. Contents files (HHC, or COL for collections) become a typed tree with
//!    archive placeholders ([`contents`]).
//! 3. The binary topic table and A-link/K-link B-trees are decoded
//!    ([`chm`]).
//! 4. A pool of isolated worker processes ([`pool`]) scans every reachable
//!    page to a fixed point ([`scan`]).
//! 5. Every reference is resolved against the case-insensitive filesystem
//!    and rewritten by byte-offset splice; navigation panes, wrappers, and
//!    resolution pages are emitted ([`rewrite`]).
//!
//! ## Quick start
//!
//! ```no_run
//! use chmweb::{run, Options};
//!
//! let options = Options {
//!     inputs: vec!["manual.chm".into()],
//!     outdir: "site".into(),
//!     ..Options::default()
//! };
//! run(&options)?;
//! # Ok::<(), chmweb::Error>(())
//! ```

pub mod chm;
pub mod contents;
pub mod error;
pub mod extract;
pub mod fs_cache;
pub mod path;
pub mod pool;
pub mod registry;
pub mod rewrite;
pub mod scan;
pub mod sgml;
pub mod util;

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::chm::{AkLinkTable, ARCHIVE_WINDOW};
use crate::contents::parser::{parse_col, ColFolder};
use crate::contents::{ContentsTree, NodeData, NodeId};
use crate::extract::extract_archive;
use crate::fs_cache::FsCache;
use crate::pool::worker::{Job, JobResult};
use crate::pool::WorkerPool;
use crate::registry::ArchiveRegistry;
use crate::rewrite::RewriteOptions;
use crate::util::{fold, warn};

pub use crate::error::{Error, Result};
pub use crate::scan::TreeData;

/// A conversion run's inputs and switches.
#[derive(Debug, Default)]
pub struct Options {
    /// One `.chm`, several `.chm`s, or a single `.chw` collection.
    pub inputs: Vec<PathBuf>,
    pub outdir: PathBuf,
    /// Write every generated page as `*.gz` and drop the plain original.
    pub gzip_pages: bool,
    /// Dump the finished contents tree as JSON to this path.
    pub toc_json: Option<PathBuf>,
    /// Worker process count; defaults to available parallelism.
    pub jobs: Option<usize>,
}

/// Convert the given archives into a website under `options.outdir`.
pub fn run(options: &Options) -> Result<()> {
    if options.inputs.is_empty() {
        return Err(Error::InvalidArchive("no input archives".into()));
    }
    std::fs::create_dir_all(&options.outdir)?;

    let mut registry = ArchiveRegistry::new();
    let mut tree = ContentsTree::new();
    let mut links = AkLinkTable::new();

    let collection = options.inputs.len() == 1 && has_extension(&options.inputs[0], "chw");
    if options.inputs.len() > 1 && options.inputs.iter().any(|p| has_extension(p, "chw")) {
        return Err(Error::InvalidArchive(
            "a .chw collection must be the only input".into(),
        ));
    }
    if collection {
        setup_collection(
            &options.inputs[0],
            &options.outdir,
            &mut registry,
            &mut tree,
            &mut links,
        )?;
    } else {
        setup_archives(
            &options.inputs,
            &options.outdir,
            &mut registry,
            &mut tree,
            &mut links,
        )?;
    }

    let fs = FsCache::new(&options.outdir);
    let jobs = options.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
    });
    let exe = std::env::current_exe()?;
    let mut pool: WorkerPool<Job, JobResult> = WorkerPool::spawn(jobs, || {
        let mut command = Command::new(&exe);
        command.arg("--worker");
        command
    })?;

    let data = scan::scan(&fs, &mut pool, registry, tree, links)?;
    pool.shutdown()?;

    let rewrite_options = RewriteOptions {
        gzip_pages: options.gzip_pages,
        toc_json: options.toc_json.clone(),
    };
    rewrite::run(&fs, &data, &rewrite_options)
}

/// Single- or multi-archive mode: each `.chm` extracts into the output root
/// (single) or its own stem-named subdirectory (multi), and the skeleton
/// tree is one placeholder per archive in input order.
fn setup_archives(
    inputs: &[PathBuf],
    outdir: &Path,
    registry: &mut ArchiveRegistry,
    tree: &mut ContentsTree,
    links: &mut AkLinkTable,
) -> Result<()> {
    let multi = inputs.len() > 1;
    for input in inputs {
        let stem = archive_stem(input)?;
        let subdir = if multi { stem.clone() } else { String::new() };
        registry.register(&stem, &subdir)?;
        let dest = if multi {
            outdir.join(&stem)
        } else {
            outdir.to_path_buf()
        };
        extract_archive(input, &dest)?;
    }

    for (i, entry) in registry.entries().to_vec().iter().enumerate() {
        let base = if multi { (i as u32 + 1) * ARCHIVE_WINDOW } else { 0 };
        let dir = if entry.subdir.is_empty() {
            outdir.to_path_buf()
        } else {
            outdir.join(&entry.subdir)
        };
        links.load_archive(&dir, &entry.subdir, base)?;
    }

    let root = tree.root();
    for entry in registry.entries().to_vec() {
        let node = tree.alloc(NodeData::ArchiveRef { stem: entry.stem });
        tree.append(root, node);
    }
    Ok(())
}

/// Collection mode: the sibling `.col` file drives the folder layout, the
/// `.chw`'s `$HHTitleMap` fixes the topic windows, and its aggregate
/// B-trees carry the merged keyword maps.
fn setup_collection(
    chw: &Path,
    outdir: &Path,
    registry: &mut ArchiveRegistry,
    tree: &mut ContentsTree,
    links: &mut AkLinkTable,
) -> Result<()> {
    let dir = chw.parent().unwrap_or(Path::new("."));
    let stem = archive_stem(chw)?;
    let col_path = find_sibling(dir, &stem, "col").ok_or_else(|| {
        Error::InvalidContents(format!("no .col file beside {}", chw.display()))
    })?;
    let folders = parse_col(&std::fs::read(col_path)?)?;

    // Register and extract every archive the collection names, in contents
    // order; the registry is the authority on stems and subdirectories.
    for stem in collect_archive_stems(&folders) {
        registry.register(&stem, &stem)?;
        match find_sibling(dir, &stem, "chm") {
            Some(archive) => extract_archive(&archive, &outdir.join(&stem))?,
            None => warn(&format!("collection names {stem:?} but no such archive exists")),
        }
    }

    // The chw itself holds the title map and aggregate B-trees.
    let staging = tempfile::tempdir()?;
    extract_archive(chw, staging.path())?;

    let title_map = chm::read_side_file(staging.path(), "$HHTitleMap")?
        .ok_or_else(|| Error::InvalidArchive("collection has no $HHTitleMap".into()))?;
    for (i, stem) in chm::parse_title_map(&title_map)?.iter().enumerate() {
        let base = (i as u32 + 1) * ARCHIVE_WINDOW;
        match registry.get(stem) {
            Some(entry) => {
                let subdir = entry.subdir.clone();
                links.load_archive(&outdir.join(&subdir), &subdir, base)?;
            }
            None => {
                // In the title map but not the contents: its topics are
                // still addressable through the aggregate B-trees.
                registry.register(stem, stem)?;
                match find_sibling(dir, stem, "chm") {
                    Some(archive) => {
                        extract_archive(&archive, &outdir.join(stem))?;
                        links.load_archive(&outdir.join(stem), stem, base)?;
                    }
                    None => warn(&format!("title map names {stem:?} but no such archive exists")),
                }
            }
        }
    }
    links.load_btrees(staging.path(), 0)?;

    let root = tree.root();
    col_to_tree(tree, root, &folders);
    Ok(())
}

fn collect_archive_stems(folders: &[ColFolder]) -> Vec<String> {
    let mut stems = Vec::new();
    fn visit(folders: &[ColFolder], stems: &mut Vec<String>) {
        for folder in folders {
            if let Some(stem) = folder.archive_stem() {
                stems.push(stem.to_string());
            }
            visit(&folder.children, stems);
        }
    }
    visit(folders, &mut stems);
    stems
}

fn col_to_tree(tree: &mut ContentsTree, parent: NodeId, folders: &[ColFolder]) {
    for folder in folders {
        match folder.archive_stem() {
            Some(stem) => {
                let node = tree.alloc(NodeData::ArchiveRef { stem: stem.to_string() });
                tree.append(parent, node);
            }
            None => {
                let node = tree.alloc(NodeData::Folder {
                    title: folder.title.clone(),
                });
                tree.append(parent, node);
                col_to_tree(tree, node, &folder.children);
            }
        }
    }
}

fn archive_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidArchive(format!("no archive stem in {}", path.display())))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Find `stem.ext` next to the collection file, matching case-insensitively.
fn find_sibling(dir: &Path, stem: &str, ext: &str) -> Option<PathBuf> {
    let want = fold(&format!("{stem}.{ext}"));
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .find(|e| fold(&e.file_name().to_string_lossy()) == want)
        .map(|e| e.path())
}
