//! Loading the binary side tables from an extracted archive directory,
//! including the keyword B-tree and multi-archive windowing.

use std::path::Path;

use chmweb::chm::{AkLinkTable, Topic, ARCHIVE_WINDOW};

/// Write `#TOPICS`/`#STRINGS`/`#URLTBL`/`#URLSTR` describing local topics.
fn write_side_tables(dir: &Path, entries: &[(&str, &str)]) {
    let mut topics = Vec::new();
    let mut strings = vec![0u8];
    let mut urltbl = Vec::new();
    let mut urlstr = vec![0u8];

    for (slot, (name, filename)) in entries.iter().enumerate() {
        let name_off = strings.len() as u32;
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);

        let str_off = urlstr.len() as u32;
        urlstr.extend_from_slice(&0u32.to_le_bytes());
        urlstr.extend_from_slice(&0u32.to_le_bytes());
        urlstr.extend_from_slice(filename.as_bytes());
        urlstr.push(0);

        let tbl_off = urltbl.len() as u32;
        urltbl.extend_from_slice(&0u32.to_le_bytes());
        urltbl.extend_from_slice(&(slot as u32).to_le_bytes());
        urltbl.extend_from_slice(&str_off.to_le_bytes());

        topics.extend_from_slice(&0u32.to_le_bytes());
        topics.extend_from_slice(&name_off.to_le_bytes());
        topics.extend_from_slice(&tbl_off.to_le_bytes());
        topics.extend_from_slice(&0u32.to_le_bytes());
    }

    std::fs::write(dir.join("#TOPICS"), topics).unwrap();
    std::fs::write(dir.join("#STRINGS"), strings).unwrap();
    std::fs::write(dir.join("#URLTBL"), urltbl).unwrap();
    std::fs::write(dir.join("#URLSTR"), urlstr).unwrap();
}

/// Write a one-block keyword B-tree mapping `keyword` to topic slots.
fn write_keyword_btree(dir: &Path, subdir: &str, keyword: &str, slots: &[u32]) {
    let mut data = vec![0u8; 76];
    data[0] = 0x3B;
    data[1] = 0x29;
    data[0x1A..0x1E].copy_from_slice(&0u32.to_le_bytes());

    let mut block = vec![0u8; 12];
    block[2..4].copy_from_slice(&1u16.to_le_bytes());
    for unit in keyword.encode_utf16() {
        block.extend_from_slice(&unit.to_le_bytes());
    }
    block.extend_from_slice(&[0, 0]);
    block.extend_from_slice(&0u16.to_le_bytes()); // not see-also
    block.extend_from_slice(&0u16.to_le_bytes()); // depth
    block.extend_from_slice(&0u32.to_le_bytes()); // display starts at 0
    block.extend_from_slice(&0u32.to_le_bytes()); // reserved
    block.extend_from_slice(&(slots.len() as u16).to_le_bytes());
    for &slot in slots {
        block.extend_from_slice(&slot.to_le_bytes());
    }
    block.extend_from_slice(&1u32.to_le_bytes()); // reserved
    block.extend_from_slice(&0u32.to_le_bytes()); // first monotonic index
    block.resize(2048, 0);
    data.extend_from_slice(&block);

    let tree_dir = dir.join(subdir);
    std::fs::create_dir_all(&tree_dir).unwrap();
    std::fs::write(tree_dir.join("BTree"), data).unwrap();
}

#[test]
fn loads_topics_and_keyword_map_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_side_tables(
        dir.path(),
        &[
            ("Introduction", "html/intro.htm"),
            ("Setup", "html/setup.htm"),
        ],
    );
    write_keyword_btree(dir.path(), "$WWKeywordLinks", "setup", &[1]);
    write_keyword_btree(dir.path(), "$WWAssociativeLinks", "getting started", &[0, 1]);

    let mut links = AkLinkTable::new();
    links.load_archive(dir.path(), "", 0).unwrap();

    assert_eq!(links.all_topics().count(), 2);
    assert_eq!(
        links.topic(0),
        Some(&Topic::Local {
            name: Some("Introduction".into()),
            path: "html/intro.htm".into()
        })
    );

    let klink = links.klink("SETUP").expect("case-insensitive lookup");
    assert_eq!(klink.topics.len(), 1);

    let alink = links.alink("getting started").unwrap();
    assert_eq!(alink.topics.len(), 2);

    assert_eq!(
        links.local_seed_paths(),
        vec!["html/intro.htm".to_string(), "html/setup.htm".to_string()]
    );
}

#[test]
fn multi_archive_windows_keep_topics_apart() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    write_side_tables(dir_a.path(), &[("A", "a.htm")]);
    write_side_tables(dir_b.path(), &[("B", "b.htm")]);

    let mut links = AkLinkTable::new();
    links.load_archive(dir_a.path(), "first", ARCHIVE_WINDOW).unwrap();
    links
        .load_archive(dir_b.path(), "second", 2 * ARCHIVE_WINDOW)
        .unwrap();

    assert_eq!(
        links.topic(ARCHIVE_WINDOW),
        Some(&Topic::Local {
            name: Some("A".into()),
            path: "first/a.htm".into()
        })
    );
    assert_eq!(
        links.topic(2 * ARCHIVE_WINDOW),
        Some(&Topic::Local {
            name: Some("B".into()),
            path: "second/b.htm".into()
        })
    );
    assert_eq!(links.topic(0), None);
}

#[test]
fn missing_topics_table_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut links = AkLinkTable::new();
    links.load_archive(dir.path(), "", 0).unwrap();
    assert_eq!(links.all_topics().count(), 0);
}

#[test]
fn corrupt_url_table_aborts_loading() {
    let dir = tempfile::tempdir().unwrap();
    write_side_tables(dir.path(), &[("A", "a.htm")]);
    // Break the slot echo.
    let mut urltbl = std::fs::read(dir.path().join("#URLTBL")).unwrap();
    urltbl[4..8].copy_from_slice(&9u32.to_le_bytes());
    std::fs::write(dir.path().join("#URLTBL"), urltbl).unwrap();

    let mut links = AkLinkTable::new();
    assert!(links.load_archive(dir.path(), "", 0).is_err());
}
