//! Event bridge over the SGML/HTML pull parser.
//!
//! Adapts quick-xml's pull events into start/end/characters callbacks that
//! carry byte offsets and line numbers, which the page scanner uses for
//! discovery and the rewriter uses to splice replacements into the original
//! byte stream. Help sources are old pseudo-HTML: end tags may be missing or
//! mismatched, attributes may be unquoted, and entities may be malformed, so
//! every strictness knob is off and undecodable pieces degrade instead of
//! aborting.
//!
//! Script element bodies are opaque: no events are delivered between a
//! `<script>` start tag and its matching end tag. Attribute lists preserve
//! source order and capitalisation; lookups are ASCII-case-insensitive.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Source location of a markup token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    /// Byte offset of the token's `<`.
    pub offset: usize,
    /// One past the token's terminating `>`.
    pub end: usize,
    /// 1-based line number of the token start.
    pub line: u32,
}

/// An attribute with its source capitalisation intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// Ordered attribute list with case-insensitive lookup.
///
/// Attribute lists are short; linear search under ASCII case folding keeps
/// the original capitalisation available for tag re-emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(pub Vec<Attr>);

impl Attrs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.0.iter()
    }
}

/// Case-insensitive element name comparison.
pub fn name_is(name: &str, expect: &str) -> bool {
    name.eq_ignore_ascii_case(expect)
}

/// Receiver for bridge events. All methods default to no-ops so handlers
/// implement only what they consume.
pub trait SgmlHandler {
    fn start_element(&mut self, _name: &str, _attrs: &Attrs, _loc: Loc) {}
    fn end_element(&mut self, _name: &str, _loc: Loc) {}
    fn characters(&mut self, _data: &str) {}
}

/// Parse a byte buffer, delivering events to `handler`.
///
/// Errors indicate markup the parser could not tokenise at all; callers
/// treat them as per-document problems, keeping whatever was delivered
/// before the failure.
pub fn parse(bytes: &[u8], handler: &mut dyn SgmlHandler) -> Result<()> {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut buf = Vec::new();
    let mut lines = LineCounter::new(bytes);
    let mut in_script = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::InvalidContents(format!("markup error: {e}")))?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if !in_script {
                    let raw_len = e.len() + 2;
                    let loc = lines.loc(end - raw_len, end);
                    let attrs = collect_attrs(e);
                    handler.start_element(&name, &attrs, loc);
                    if name_is(&name, "script") {
                        // The tag itself is an event; the body is opaque.
                        in_script = true;
                    }
                }
            }
            Event::Empty(ref e) => {
                if !in_script {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let raw_len = e.len() + 3;
                    let loc = lines.loc(end - raw_len, end);
                    let attrs = collect_attrs(e);
                    handler.start_element(&name, &attrs, loc);
                    handler.end_element(&name, loc);
                }
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if in_script && !name_is(&name, "script") {
                    // Part of the opaque body.
                } else {
                    in_script = false;
                    let raw_len = e.name().as_ref().len() + 3;
                    let loc = lines.loc(end - raw_len, end);
                    handler.end_element(&name, loc);
                }
            }
            Event::Text(ref e) => {
                if !in_script {
                    let text = match e.unescape() {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => String::from_utf8_lossy(e).into_owned(),
                    };
                    handler.characters(&text);
                }
            }
            Event::CData(ref e) => {
                if !in_script {
                    handler.characters(&String::from_utf8_lossy(e));
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => return Ok(()),
        }
        buf.clear();
    }
}

fn collect_attrs(e: &quick_xml::events::BytesStart<'_>) -> Attrs {
    let mut attrs = Vec::new();
    for attr in e.html_attributes().flatten() {
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(cow) => cow.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push(Attr { name, value });
    }
    Attrs(attrs)
}

/// Incremental newline counter; positions only ever move forward.
struct LineCounter<'a> {
    bytes: &'a [u8],
    counted: usize,
    line: u32,
}

impl<'a> LineCounter<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            counted: 0,
            line: 1,
        }
    }

    fn loc(&mut self, offset: usize, end: usize) -> Loc {
        if offset > self.counted {
            let span = &self.bytes[self.counted..offset];
            self.line += memchr::memchr_iter(b'\n', span).count() as u32;
            self.counted = offset;
        }
        Loc {
            offset,
            end,
            line: self.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(String, String, usize, usize, u32)>,
        text: String,
    }

    impl SgmlHandler for Recorder {
        fn start_element(&mut self, name: &str, attrs: &Attrs, loc: Loc) {
            let attrs = attrs
                .iter()
                .map(|a| format!("{}={}", a.name, a.value))
                .collect::<Vec<_>>()
                .join(",");
            self.events
                .push((format!("<{name}>"), attrs, loc.offset, loc.end, loc.line));
        }
        fn end_element(&mut self, name: &str, loc: Loc) {
            self.events
                .push((format!("</{name}>"), String::new(), loc.offset, loc.end, loc.line));
        }
        fn characters(&mut self, data: &str) {
            self.text.push_str(data);
        }
    }

    #[test]
    fn offsets_and_lines() {
        let src = b"<html>\n<BODY>\n<A HREF=\"x.htm\">go</A>\n</BODY></html>";
        let mut rec = Recorder::default();
        parse(src, &mut rec).unwrap();

        let a = rec
            .events
            .iter()
            .find(|(n, ..)| n == "<A>")
            .expect("anchor seen");
        assert_eq!(a.1, "HREF=x.htm");
        assert_eq!(a.2, 14);
        assert_eq!(a.3, 30);
        assert_eq!(a.4, 3);
        assert_eq!(&src[a.2..a.3], b"<A HREF=\"x.htm\">".as_ref());
        assert_eq!(rec.text.trim(), "go");
    }

    #[test]
    fn attribute_order_and_case_preserved() {
        let src = b"<IMG Border=0 SRC='a.gif' Alt=\"pic\">";
        let mut rec = Recorder::default();
        parse(src, &mut rec).unwrap();
        assert_eq!(rec.events[0].1, "Border=0,SRC=a.gif,Alt=pic");
    }

    #[test]
    fn attrs_lookup_ignores_case() {
        let attrs = Attrs(vec![Attr {
            name: "HREF".into(),
            value: "x".into(),
        }]);
        assert_eq!(attrs.get("href"), Some("x"));
        assert_eq!(attrs.get("src"), None);
    }

    #[test]
    fn script_body_is_opaque() {
        let src = b"<script>document.write('<a href=\"no.htm\">');</script><a href=\"yes.htm\">";
        let mut rec = Recorder::default();
        parse(src, &mut rec).unwrap();
        let anchors: Vec<_> = rec.events.iter().filter(|(n, ..)| n == "<a>").collect();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].1, "href=yes.htm");
    }

    #[test]
    fn unmatched_end_tags_are_delivered() {
        let src = b"<ul><li>one</li></li></ul>";
        let mut rec = Recorder::default();
        parse(src, &mut rec).unwrap();
        let ends = rec.events.iter().filter(|(n, ..)| n == "</li>").count();
        assert_eq!(ends, 2);
    }

    #[test]
    fn empty_element_gets_both_events() {
        let src = b"<br/>";
        let mut rec = Recorder::default();
        parse(src, &mut rec).unwrap();
        assert_eq!(rec.events.len(), 2);
        assert_eq!(rec.events[0].2, 0);
        assert_eq!(rec.events[0].3, 5);
    }
}
