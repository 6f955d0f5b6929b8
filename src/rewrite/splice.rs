//! Byte-offset splices over an original page buffer.
//!
//! The rewriter never re-serialises markup; it records an ordered list of
//! `{offset, original length, replacement}` edits against the original
//! bytes and applies them in one pass. Splices must not overlap, and each
//! splice's span must lie inside the buffer — both are programming errors,
//! not input errors, so they assert.

/// One replacement of `len` original bytes at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub offset: usize,
    pub len: usize,
    pub replacement: Vec<u8>,
}

/// An ordered splice list for one page.
#[derive(Debug, Default)]
pub struct SpliceList {
    splices: Vec<Splice>,
}

impl SpliceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.splices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.splices.len()
    }

    /// Record a replacement. Splices may be pushed in any order; they are
    /// sorted at apply time.
    pub fn push(&mut self, offset: usize, len: usize, replacement: impl Into<Vec<u8>>) {
        self.splices.push(Splice {
            offset,
            len,
            replacement: replacement.into(),
        });
    }

    /// Apply all splices to `source`, in increasing offset order with a
    /// running adjustment.
    pub fn apply(mut self, source: &[u8]) -> Vec<u8> {
        self.splices.sort_by_key(|s| s.offset);

        let mut out = Vec::with_capacity(source.len());
        let mut cursor = 0;
        for splice in &self.splices {
            assert!(
                splice.offset >= cursor,
                "overlapping splice at offset {}",
                splice.offset
            );
            let end = splice.offset + splice.len;
            assert!(
                end <= source.len(),
                "splice [{}..{end}] outside page of {} bytes",
                splice.offset,
                source.len()
            );
            out.extend_from_slice(&source[cursor..splice.offset]);
            out.extend_from_slice(&splice.replacement);
            cursor = end;
        }
        out.extend_from_slice(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_in_offset_order() {
        let src = b"0123456789";
        let mut list = SpliceList::new();
        // Pushed out of order on purpose.
        list.push(6, 2, b"XY".as_ref());
        list.push(1, 3, b"a".as_ref());
        assert_eq!(list.apply(src), b"0a45XY89");
    }

    #[test]
    fn empty_replacement_consumes_span() {
        let src = b"keep<object>gone</object>keep";
        let mut list = SpliceList::new();
        list.push(4, 21, Vec::new());
        assert_eq!(list.apply(src), b"keepkeep");
    }

    #[test]
    fn insertion_at_length_zero_span() {
        let src = b"ab";
        let mut list = SpliceList::new();
        list.push(1, 0, b"-".as_ref());
        assert_eq!(list.apply(src), b"a-b");
    }

    #[test]
    #[should_panic(expected = "overlapping splice")]
    fn overlap_asserts() {
        let mut list = SpliceList::new();
        list.push(0, 5, b"x".as_ref());
        list.push(3, 2, b"y".as_ref());
        list.apply(b"0123456789");
    }

    #[test]
    #[should_panic(expected = "outside page")]
    fn out_of_range_asserts() {
        let mut list = SpliceList::new();
        list.push(8, 5, b"x".as_ref());
        list.apply(b"0123456789");
    }
}
