//! Walker for the `$WWAssociativeLinks`/`$WWKeywordLinks` B-tree files.
//!
//! Only the listing blocks are walked; the index blocks above them exist to
//! speed up point lookups inside the original viewer and carry no extra
//! information. Keywords are NUL-terminated UTF-16LE, with parent keywords
//! joined onto the front by `", "`; the character offset stored per entry
//! marks where the local display name starts. Every entry ends with a
//! monotonic file-wide index that steps by 13, which doubles as a corruption
//! check.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::util::fold;

use super::{u16_at, u32_at, KeywordEntry, Topic};

const HEADER_LEN: usize = 76;
const BLOCK_LEN: usize = 2048;
const SEE_ALSO_FLAG: u16 = 2;
const INDEX_STEP: u32 = 13;

/// Parse one B-tree file, merging its keywords into `map`.
///
/// `base` is added to every topic index before resolution; pass the
/// archive's window base for per-archive trees and 0 for the aggregate
/// trees of a collection, whose indices are already split.
pub fn parse_btree(
    data: &[u8],
    topics: &BTreeMap<u32, Topic>,
    base: u32,
    map: &mut BTreeMap<String, KeywordEntry>,
) -> Result<()> {
    if data.len() < HEADER_LEN || data[0] != 0x3B || data[1] != 0x29 {
        return Err(Error::InvalidArchive("bad B-tree signature".into()));
    }
    let block_count = u32_at(data, 0x1A)? + 1;

    let mut expected_index = 0u32;
    for block in 0..block_count {
        let block_off = HEADER_LEN + block as usize * BLOCK_LEN;
        let entry_count = u16_at(data, block_off + 2)?;
        let mut off = block_off + 12;
        for _ in 0..entry_count {
            off = parse_entry(data, off, topics, base, map, expected_index)?;
            expected_index += INDEX_STEP;
        }
    }
    Ok(())
}

fn parse_entry(
    data: &[u8],
    mut off: usize,
    topics: &BTreeMap<u32, Topic>,
    base: u32,
    map: &mut BTreeMap<String, KeywordEntry>,
    expected_index: u32,
) -> Result<usize> {
    let keyword = utf16z_at(data, &mut off)?;
    let flag = u16_at(data, off)?;
    off += 2;
    let _depth = u16_at(data, off)?;
    off += 2;
    let last_char = u32_at(data, off)? as usize;
    off += 4;
    off += 4; // reserved
    let pair_count = u16_at(data, off)?;
    off += 2;

    let display: String = {
        let units: Vec<u16> = keyword.encode_utf16().collect();
        String::from_utf16_lossy(&units[last_char.min(units.len())..])
    };

    let entry = map.entry(fold(&keyword)).or_insert_with(|| KeywordEntry {
        display,
        ..KeywordEntry::default()
    });

    if flag == SEE_ALSO_FLAG {
        let target = utf16z_at(data, &mut off)?;
        entry.see_also.push(target);
    } else {
        for _ in 0..pair_count {
            let index = u32_at(data, off)?;
            off += 4;
            if let Some(topic) = topics.get(&(base + index)) {
                entry.topics.push(topic.clone());
            }
        }
    }

    off += 4; // reserved
    let index = u32_at(data, off)?;
    off += 4;
    if index != expected_index {
        return Err(Error::InvalidArchive(format!(
            "B-tree entry index {index} out of sequence, expected {expected_index}"
        )));
    }
    Ok(off)
}

/// NUL-terminated UTF-16LE string at `*off`, advancing past the terminator.
fn utf16z_at(data: &[u8], off: &mut usize) -> Result<String> {
    let mut units = Vec::new();
    loop {
        let unit = u16_at(data, *off)?;
        *off += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Payload<'a> {
        Topics(&'a [u32]),
        SeeAlso(&'a str),
    }

    struct TestEntry<'a> {
        keyword: &'a str,
        last_char: u32,
        payload: Payload<'a>,
    }

    fn push_utf16z(out: &mut Vec<u8>, s: &str) {
        for unit in s.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
    }

    fn build_btree(blocks: &[&[TestEntry]]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[0] = 0x3B;
        data[1] = 0x29;
        data[0x1A..0x1E].copy_from_slice(&(blocks.len() as u32 - 1).to_le_bytes());

        let mut index = 0u32;
        for entries in blocks {
            let mut block = vec![0u8; 12];
            block[2..4].copy_from_slice(&(entries.len() as u16).to_le_bytes());
            for entry in *entries {
                push_utf16z(&mut block, entry.keyword);
                let flag: u16 = match entry.payload {
                    Payload::SeeAlso(_) => SEE_ALSO_FLAG,
                    Payload::Topics(_) => 0,
                };
                block.extend_from_slice(&flag.to_le_bytes());
                block.extend_from_slice(&0u16.to_le_bytes()); // depth
                block.extend_from_slice(&entry.last_char.to_le_bytes());
                block.extend_from_slice(&0u32.to_le_bytes()); // reserved
                match entry.payload {
                    Payload::Topics(indices) => {
                        block.extend_from_slice(&(indices.len() as u16).to_le_bytes());
                        for &i in indices {
                            block.extend_from_slice(&i.to_le_bytes());
                        }
                    }
                    Payload::SeeAlso(target) => {
                        block.extend_from_slice(&1u16.to_le_bytes());
                        push_utf16z(&mut block, target);
                    }
                }
                block.extend_from_slice(&1u32.to_le_bytes()); // reserved
                block.extend_from_slice(&index.to_le_bytes());
                index += INDEX_STEP;
            }
            block.resize(BLOCK_LEN, 0);
            data.extend_from_slice(&block);
        }
        data
    }

    fn topic(path: &str) -> Topic {
        Topic::Local {
            name: None,
            path: path.into(),
        }
    }

    fn sample_topics() -> BTreeMap<u32, Topic> {
        [
            (0, topic("a.htm")),
            (1, topic("b.htm")),
            (2, topic("c.htm")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn walks_blocks_and_resolves_topics() {
        let data = build_btree(&[
            &[
                TestEntry {
                    keyword: "install",
                    last_char: 0,
                    payload: Payload::Topics(&[0]),
                },
                TestEntry {
                    keyword: "install, advanced",
                    last_char: 9,
                    payload: Payload::Topics(&[1, 2]),
                },
            ],
            &[TestEntry {
                keyword: "setup",
                last_char: 0,
                payload: Payload::SeeAlso("install"),
            }],
        ]);

        let topics = sample_topics();
        let mut map = BTreeMap::new();
        parse_btree(&data, &topics, 0, &mut map).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map["install"].topics, vec![topic("a.htm")]);

        let advanced = &map["install, advanced"];
        assert_eq!(advanced.display, "advanced");
        assert_eq!(advanced.topics, vec![topic("b.htm"), topic("c.htm")]);

        let setup = &map["setup"];
        assert!(setup.topics.is_empty());
        assert_eq!(setup.see_also, vec!["install".to_string()]);
    }

    #[test]
    fn entry_count_matches_monotonic_index() {
        let entries: Vec<TestEntry> = (0..5)
            .map(|i| TestEntry {
                keyword: match i {
                    0 => "k0",
                    1 => "k1",
                    2 => "k2",
                    3 => "k3",
                    _ => "k4",
                },
                last_char: 0,
                payload: Payload::Topics(&[0]),
            })
            .collect();
        let data = build_btree(&[&entries[..2], &entries[2..]]);

        // The file's final monotonic index / 13 + 1 equals the entry count.
        let mut map = BTreeMap::new();
        parse_btree(&data, &sample_topics(), 0, &mut map).unwrap();
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn bad_signature_is_fatal() {
        let mut data = build_btree(&[&[]]);
        data[0] = 0;
        let mut map = BTreeMap::new();
        assert!(parse_btree(&data, &sample_topics(), 0, &mut map).is_err());
    }

    #[test]
    fn out_of_sequence_index_is_fatal() {
        let mut data = build_btree(&[&[TestEntry {
            keyword: "k",
            last_char: 0,
            payload: Payload::Topics(&[0]),
        }]]);
        // Corrupt the trailing index of the only entry: keyword(4) +
        // flag(2) + depth(2) + char(4) + rsvd(4) + count(2) + topic(4) +
        // rsvd(4) = 26 bytes before it.
        let entry_off = HEADER_LEN + 12;
        data[entry_off + 26..entry_off + 30].copy_from_slice(&99u32.to_le_bytes());
        let mut map = BTreeMap::new();
        assert!(parse_btree(&data, &sample_topics(), 0, &mut map).is_err());
    }

    #[test]
    fn window_base_offsets_topic_indices() {
        let data = build_btree(&[&[TestEntry {
            keyword: "k",
            last_char: 0,
            payload: Payload::Topics(&[1]),
        }]]);
        let topics: BTreeMap<u32, Topic> =
            [(crate::chm::ARCHIVE_WINDOW + 1, topic("w.htm"))].into_iter().collect();
        let mut map = BTreeMap::new();
        parse_btree(&data, &topics, crate::chm::ARCHIVE_WINDOW, &mut map).unwrap();
        assert_eq!(map["k"].topics, vec![topic("w.htm")]);
    }
}
