//! Decoders for the binary cross-reference tables of a help archive.
//!
//! An extracted archive carries five side files: `#TOPICS` (fixed 16-byte
//! records), `#STRINGS` (NUL-terminated display names), `#URLTBL` /
//! `#URLSTR` (the indirection from topic slot to target), and optionally the
//! associative/keyword B-trees under `$WWAssociativeLinks` and
//! `$WWKeywordLinks`. Everything is decoded from borrowed byte slices with
//! explicit little-endian reads and bounds checks; corruption is fatal.

pub mod btree;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::join_subdir;
use crate::util::fold;

/// Width of one archive's topic-index window in multi-archive mode.
pub const ARCHIVE_WINDOW: u32 = 1 << 20;

/// `#TOPICS` sentinel for "no display name".
pub const NO_STRING: u32 = 0xFFFF_FFFF;

/// A named destination within an archive, or a forwarding keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// A file inside the output tree, path already subdirectory-prefixed
    /// and root-relative.
    Local { name: Option<String>, path: String },
    /// An external URL, optionally targeted at a named frame.
    External {
        name: Option<String>,
        url: String,
        frame: String,
    },
}

impl Topic {
    pub fn display(&self) -> &str {
        let name = match self {
            Topic::Local { name, .. } | Topic::External { name, .. } => name.as_deref(),
        };
        name.unwrap_or(match self {
            Topic::Local { path, .. } => path,
            Topic::External { url, .. } => url,
        })
    }
}

/// Topics and see-also forwards recorded under one keyword.
#[derive(Debug, Clone, Default)]
pub struct KeywordEntry {
    /// Display form of the keyword (the local suffix of the joined chain).
    pub display: String,
    pub topics: Vec<Topic>,
    pub see_also: Vec<String>,
}

/// The loaded topic table plus both keyword maps.
///
/// Topic indices are plain slots in single-archive mode and
/// `ordinal * ARCHIVE_WINDOW + slot` in multi-archive mode; a `BTreeMap`
/// keyed by the global index covers both without caring which.
#[derive(Debug, Default)]
pub struct AkLinkTable {
    topics: BTreeMap<u32, Topic>,
    alinks: BTreeMap<String, KeywordEntry>,
    klinks: BTreeMap<String, KeywordEntry>,
}

impl AkLinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one archive's side tables from its extracted directory.
    ///
    /// `subdir` is the archive's output subdirectory (prefixed onto local
    /// topic filenames); `base` is the archive's window base in the global
    /// topic index space (0 for single-archive mode).
    pub fn load_archive(&mut self, dir: &Path, subdir: &str, base: u32) -> Result<()> {
        let Some(topics_data) = read_side_file(dir, "#TOPICS")? else {
            return Ok(());
        };
        let strings = read_side_file(dir, "#STRINGS")?.unwrap_or_default();
        let urltbl = read_side_file(dir, "#URLTBL")?
            .ok_or_else(|| Error::InvalidArchive("#URLTBL missing".into()))?;
        let urlstr = read_side_file(dir, "#URLSTR")?
            .ok_or_else(|| Error::InvalidArchive("#URLSTR missing".into()))?;

        let count = topics_data.len() / 16;
        for slot in 0..count {
            let topic = decode_topic(
                &topics_data,
                &strings,
                &urltbl,
                &urlstr,
                slot as u32,
                subdir,
            )?;
            self.topics.insert(base + slot as u32, topic);
        }

        self.load_btrees(dir, base)
    }

    /// Load the A-link and K-link B-trees found in `dir`, resolving topic
    /// indices against the table with `base` added (pass 0 when the trees
    /// already use split indices, as the aggregate trees of a `.chw` do).
    pub fn load_btrees(&mut self, dir: &Path, base: u32) -> Result<()> {
        if let Some(data) = read_side_file(dir, "$WWAssociativeLinks/BTree")? {
            btree::parse_btree(&data, &self.topics, base, &mut self.alinks)?;
        }
        if let Some(data) = read_side_file(dir, "$WWKeywordLinks/BTree")? {
            btree::parse_btree(&data, &self.topics, base, &mut self.klinks)?;
        }
        Ok(())
    }

    /// Insert a topic at an explicit global index.
    pub fn insert_topic(&mut self, index: u32, topic: Topic) {
        self.topics.insert(index, topic);
    }

    /// Record topics under an A-link keyword.
    pub fn add_alink(&mut self, keyword: &str, topics: Vec<Topic>) {
        add_keyword(&mut self.alinks, keyword, topics);
    }

    /// Record topics under a K-link keyword.
    pub fn add_klink(&mut self, keyword: &str, topics: Vec<Topic>) {
        add_keyword(&mut self.klinks, keyword, topics);
    }

    /// Topics in on-disk (global index) order.
    pub fn all_topics(&self) -> impl Iterator<Item = (u32, &Topic)> {
        self.topics.iter().map(|(&i, t)| (i, t))
    }

    /// Topic by global index (plain slot or split archive index).
    pub fn topic(&self, index: u32) -> Option<&Topic> {
        self.topics.get(&index)
    }

    pub fn alink(&self, name: &str) -> Option<&KeywordEntry> {
        self.alinks.get(&fold(name))
    }

    pub fn klink(&self, name: &str) -> Option<&KeywordEntry> {
        self.klinks.get(&fold(name))
    }

    /// Root-relative filenames of every local topic reachable from either
    /// keyword map. These seed the discovery fixed point.
    pub fn local_seed_paths(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in self.alinks.values().chain(self.klinks.values()) {
            for topic in &entry.topics {
                if let Topic::Local { path, .. } = topic {
                    seen.insert(path.clone());
                }
            }
        }
        seen.into_iter().collect()
    }
}

fn add_keyword(map: &mut BTreeMap<String, KeywordEntry>, keyword: &str, topics: Vec<Topic>) {
    let entry = map.entry(fold(keyword)).or_insert_with(|| KeywordEntry {
        display: keyword.to_string(),
        ..KeywordEntry::default()
    });
    entry.topics.extend(topics);
}

fn decode_topic(
    topics: &[u8],
    strings: &[u8],
    urltbl: &[u8],
    urlstr: &[u8],
    slot: u32,
    subdir: &str,
) -> Result<Topic> {
    let off = slot as usize * 16;
    let name_off = u32_at(topics, off + 4)?;
    let tbl_off = u32_at(topics, off + 8)? as usize;

    let name = if name_off == NO_STRING {
        None
    } else {
        Some(cstring_at(strings, name_off as usize)?)
    };

    let echo = u32_at(urltbl, tbl_off + 4)?;
    if echo != slot {
        return Err(Error::InvalidArchive(format!(
            "#URLTBL entry echoes slot {echo}, expected {slot}"
        )));
    }
    let str_off = u32_at(urltbl, tbl_off + 8)? as usize;

    let url_off = u32_at(urlstr, str_off)?;
    let frame_off = u32_at(urlstr, str_off + 4)?;
    if url_off == 0 && frame_off == 0 {
        let filename = cstring_at(urlstr, str_off + 8)?;
        Ok(Topic::Local {
            name,
            path: join_subdir(subdir, &filename.replace('\\', "/")),
        })
    } else {
        let url = if url_off == 0 {
            String::new()
        } else {
            cstring_at(urlstr, url_off as usize)?
        };
        let frame = if frame_off == 0 {
            String::new()
        } else {
            cstring_at(urlstr, frame_off as usize)?
        };
        Ok(Topic::External { name, url, frame })
    }
}

/// Parse a `$HHTitleMap` file: the archive stems of a collection, in window
/// order. Each entry is `{u16 stem length, stem UTF-8, 12 reserved bytes}`;
/// the reserved bytes are never interpreted.
pub fn parse_title_map(data: &[u8]) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    let mut off = 0;
    while off + 2 <= data.len() {
        let len = u16_at(data, off)? as usize;
        off += 2;
        if len == 0 {
            break;
        }
        let end = off + len;
        if end + 12 > data.len() {
            return Err(Error::InvalidArchive("truncated $HHTitleMap entry".into()));
        }
        stems.push(String::from_utf8_lossy(&data[off..end]).into_owned());
        off = end + 12;
    }
    Ok(stems)
}

/// Locate and read a side file under an extracted archive directory,
/// matching each path segment case-insensitively.
pub fn read_side_file(dir: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(path) = find_entry(dir, name) else {
        return Ok(None);
    };
    Ok(Some(std::fs::read(path)?))
}

fn find_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut at = dir.to_path_buf();
    for seg in name.split('/') {
        let folded = fold(seg);
        let entries = std::fs::read_dir(&at).ok()?;
        let hit = entries
            .flatten()
            .find(|e| fold(&e.file_name().to_string_lossy()) == folded)?;
        at = hit.path();
    }
    Some(at)
}

// Little-endian field readers. Every offset in these files comes from
// another file, so each read is bounds-checked.

pub(crate) fn u16_at(data: &[u8], off: usize) -> Result<u16> {
    let bytes = data
        .get(off..off + 2)
        .ok_or_else(|| Error::InvalidArchive(format!("read past end at {off:#x}")))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn u32_at(data: &[u8], off: usize) -> Result<u32> {
    let bytes = data
        .get(off..off + 4)
        .ok_or_else(|| Error::InvalidArchive(format!("read past end at {off:#x}")))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn cstring_at(data: &[u8], off: usize) -> Result<String> {
    let tail = data
        .get(off..)
        .ok_or_else(|| Error::InvalidArchive(format!("string offset {off:#x} past end")))?;
    let end = memchr::memchr(0, tail)
        .ok_or_else(|| Error::InvalidArchive("unterminated string".into()))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}
