//! Memoised filesystem queries rooted at the output directory.
//!
//! Help archives reference files with whatever capitalisation the authoring
//! tool happened to use, so link resolution has to enumerate real directory
//! entries and compare case-insensitively. Every query is cached for the
//! lifetime of the cache; call [`FsCache::reset`] if the tree underneath
//! changes (the tree scanner does this after extraction).
//!
//! The cache lives only in the parent control thread (workers receive plain
//! file paths and read them directly), so plain `RefCell` interior
//! mutability is all that is needed.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::util::{fold, warn};

pub struct FsCache {
    root: PathBuf,
    exists: RefCell<HashMap<String, bool>>,
    dirs: RefCell<HashMap<String, bool>>,
    children: RefCell<HashMap<String, Rc<Vec<String>>>>,
    warned: RefCell<HashSet<String>>,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exists: RefCell::new(HashMap::new()),
            dirs: RefCell::new(HashMap::new()),
            children: RefCell::new(HashMap::new()),
            warned: RefCell::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a root-relative one.
    pub fn abs(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    /// Whether the root-relative path exists, with the exact case given.
    pub fn exists(&self, rel: &str) -> bool {
        if let Some(&hit) = self.exists.borrow().get(rel) {
            return hit;
        }
        let hit = self.abs(rel).exists();
        self.exists.borrow_mut().insert(rel.to_string(), hit);
        hit
    }

    /// Whether the root-relative path is a directory.
    pub fn is_dir(&self, rel: &str) -> bool {
        if let Some(&hit) = self.dirs.borrow().get(rel) {
            return hit;
        }
        let hit = self.abs(rel).is_dir();
        self.dirs.borrow_mut().insert(rel.to_string(), hit);
        hit
    }

    /// Entry names of a root-relative directory, excluding `.` and `..`.
    ///
    /// A non-directory or unreadable directory yields an empty list; the
    /// unreadable case warns once per directory and the failure is cached.
    pub fn children(&self, dir: &str) -> Rc<Vec<String>> {
        if let Some(hit) = self.children.borrow().get(dir) {
            return Rc::clone(hit);
        }
        let mut names = Vec::new();
        match std::fs::read_dir(self.abs(dir)) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if let Ok(name) = entry.file_name().into_string() {
                        names.push(name);
                    }
                }
            }
            Err(err) => {
                if self.warned.borrow_mut().insert(dir.to_string()) {
                    warn(&format!("cannot read directory {dir:?}: {err}"));
                }
            }
        }
        let names = Rc::new(names);
        self.children
            .borrow_mut()
            .insert(dir.to_string(), Rc::clone(&names));
        names
    }

    /// Every entry of `dir` whose name case-folds equal to `name`.
    pub fn case_insensitive_children(&self, dir: &str, name: &str) -> Vec<String> {
        let folded = fold(name);
        self.children(dir)
            .iter()
            .filter(|entry| fold(entry) == folded)
            .cloned()
            .collect()
    }

    /// Forget every cached answer. Required after the filesystem changes.
    pub fn reset(&self) {
        self.exists.borrow_mut().clear();
        self.dirs.borrow_mut().clear();
        self.children.borrow_mut().clear();
        self.warned.borrow_mut().clear();
    }
}
