//! Byte-offset scan of raw chapter markup
//!
//! The page breaker works in markup coordinates: every page boundary is a
//! byte offset into the chapter source. This pass records, once per
//! chapter, where words start, where block elements close, and which spans
//! must not be split, so later passes can answer range queries with binary
//! searches instead of re-walking the markup.

use core::ops::Range;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::markup::{
    heading_level, is_block_tag, lenient_reader, should_skip_element, MAX_PARSE_ERRORS,
};

/// Close tags after which a page may end cleanly.
fn is_boundary_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "aside"
            | "blockquote"
            | "li"
            | "ul"
            | "ol"
            | "pre"
            | "table"
            | "figure"
    ) || heading_level(name).is_some()
}

/// Elements a page break should not fall inside.
fn protected_kind(name: &str) -> Option<ProtectedKind> {
    match name {
        "table" => Some(ProtectedKind::Table),
        "pre" => Some(ProtectedKind::Code),
        "blockquote" => Some(ProtectedKind::Quote),
        "figure" => Some(ProtectedKind::Figure),
        _ => None,
    }
}

/// What a protected span holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProtectedKind {
    Table,
    Code,
    Quote,
    Figure,
}

/// A span of markup that should stay on one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProtectedSpan {
    pub kind: ProtectedKind,
    pub range: Range<usize>,
}

/// A clean place to end a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Boundary {
    /// Byte offset just past the close tag
    pub offset: usize,
    /// The closed element was a heading
    pub after_heading: bool,
}

/// Positional index over one chapter's markup.
#[derive(Clone, Debug, Default)]
pub(crate) struct PageScan {
    len: usize,
    word_starts: Vec<usize>,
    boundaries: Vec<Boundary>,
    images: Vec<usize>,
    tables: Vec<usize>,
    protected: Vec<ProtectedSpan>,
}

struct Token {
    start: usize,
    has_alphanumeric: bool,
}

struct Scanner {
    scan: PageScan,
    token: Option<Token>,
    skip_depth: usize,
    open_protected: Vec<(ProtectedKind, usize)>,
}

impl Scanner {
    fn end_token(&mut self) {
        if let Some(token) = self.token.take() {
            if token.has_alphanumeric {
                self.scan.word_starts.push(token.start);
            }
        }
    }

    fn push_char(&mut self, offset: usize, ch: char) {
        if ch.is_whitespace() {
            self.end_token();
            return;
        }
        let token = self.token.get_or_insert(Token {
            start: offset,
            has_alphanumeric: false,
        });
        token.has_alphanumeric |= ch.is_alphanumeric();
    }

    fn start_tag(&mut self, name: &str, offset: usize) {
        if is_block_tag(name) {
            self.end_token();
        }
        match name {
            "img" | "svg" => self.scan.images.push(offset),
            "table" => self.scan.tables.push(offset),
            _ => {}
        }
        if let Some(kind) = protected_kind(name) {
            self.open_protected.push((kind, offset));
        }
    }

    fn end_tag(&mut self, name: &str, offset: usize) {
        if is_block_tag(name) {
            self.end_token();
        }
        if let Some(kind) = protected_kind(name) {
            if let Some(pos) = self.open_protected.iter().rposition(|(k, _)| *k == kind) {
                let (_, start) = self.open_protected.remove(pos);
                self.open_protected.truncate(pos);
                self.scan.protected.push(ProtectedSpan {
                    kind,
                    range: start..offset,
                });
            }
        }
        // Boundaries inside a protected span would split it
        if is_boundary_tag(name) && self.open_protected.is_empty() {
            self.scan.boundaries.push(Boundary {
                offset,
                after_heading: heading_level(name).is_some(),
            });
        }
    }

    fn finish(mut self) -> PageScan {
        self.end_token();
        let len = self.scan.len;
        for (kind, start) in self.open_protected.drain(..) {
            self.scan.protected.push(ProtectedSpan {
                kind,
                range: start..len,
            });
        }
        self.scan.protected.sort_by_key(|span| span.range.start);
        self.scan
    }
}

impl PageScan {
    /// Scan chapter markup. Malformed fragments are skipped the same way
    /// [`walk_markup`](crate::markup::walk_markup) skips them.
    pub fn new(content: &str) -> Self {
        let mut reader = lenient_reader(content);

        let mut scanner = Scanner {
            scan: PageScan {
                len: content.len(),
                ..PageScan::default()
            },
            token: None,
            skip_depth: 0,
            open_protected: Vec::new(),
        };
        let mut buf = Vec::new();
        let mut errors = 0usize;
        let mut last_error_position = None;

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event_into(&mut buf);
            let end = (reader.buffer_position() as usize).min(content.len());
            match event {
                Ok(Event::Start(e)) => {
                    let name = tag_name(&e);
                    if should_skip_element(&name) {
                        scanner.skip_depth += 1;
                    } else if scanner.skip_depth == 0 {
                        scanner.start_tag(&name, start);
                    }
                }
                Ok(Event::Empty(e)) => {
                    if scanner.skip_depth == 0 {
                        let name = tag_name(&e);
                        scanner.start_tag(&name, start);
                        scanner.end_tag(&name, end);
                    }
                }
                Ok(Event::End(e)) => {
                    let name =
                        String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                    if should_skip_element(&name) {
                        scanner.skip_depth = scanner.skip_depth.saturating_sub(1);
                    } else if scanner.skip_depth == 0 {
                        scanner.end_tag(&name, end);
                    }
                }
                Ok(Event::Text(_)) | Ok(Event::CData(_)) => {
                    if scanner.skip_depth == 0 {
                        if let Some(raw) = content.get(start..end) {
                            for (i, ch) in raw.char_indices() {
                                scanner.push_char(start + i, ch);
                            }
                        }
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if scanner.skip_depth == 0 {
                        let ch = e.decode().map(|name| entity_char(&name)).unwrap_or('?');
                        scanner.push_char(start, ch);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    log::debug!("page scan skipped fragment at byte {}: {:?}", start, err);
                    errors += 1;
                    if errors > MAX_PARSE_ERRORS || last_error_position == Some(end) {
                        log::debug!("abandoning page scan after {} errors", errors);
                        break;
                    }
                    last_error_position = Some(end);
                }
            }
            buf.clear();
        }

        scanner.finish()
    }

    /// Length of the scanned markup in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Total words in the chapter
    pub fn word_count(&self) -> usize {
        self.word_starts.len()
    }

    /// Words starting at or after `offset`
    pub fn words_from(&self, offset: usize) -> usize {
        self.word_count() - self.word_starts.partition_point(|&w| w < offset)
    }

    /// Words starting inside `range`
    pub fn words_in(&self, range: Range<usize>) -> usize {
        let lo = self.word_starts.partition_point(|&w| w < range.start);
        let hi = self.word_starts.partition_point(|&w| w < range.end);
        hi.saturating_sub(lo)
    }

    /// Offset where the `n`th word at or after `from` starts, or the end of
    /// the markup when fewer words remain.
    pub fn offset_after_words(&self, from: usize, n: usize) -> usize {
        let first = self.word_starts.partition_point(|&w| w < from);
        self.word_starts
            .get(first + n)
            .copied()
            .unwrap_or(self.len)
    }

    /// Safe boundaries with `range.start < offset <= range.end`
    pub fn boundaries_in(&self, range: Range<usize>) -> &[Boundary] {
        let lo = self.boundaries.partition_point(|b| b.offset <= range.start);
        let hi = self.boundaries.partition_point(|b| b.offset <= range.end);
        &self.boundaries[lo..hi.max(lo)]
    }

    /// Whether an image tag starts inside `range`
    pub fn has_image_in(&self, range: Range<usize>) -> bool {
        positions_in(&self.images, range)
    }

    /// Whether a table starts inside `range`
    pub fn has_table_in(&self, range: Range<usize>) -> bool {
        positions_in(&self.tables, range)
    }

    /// Innermost protected span strictly containing `offset`
    pub fn protected_at(&self, offset: usize) -> Option<&ProtectedSpan> {
        self.protected
            .iter()
            .filter(|span| span.range.start < offset && offset < span.range.end)
            .min_by_key(|span| span.range.len())
    }
}

fn positions_in(sorted: &[usize], range: Range<usize>) -> bool {
    let idx = sorted.partition_point(|&p| p < range.start);
    sorted.get(idx).is_some_and(|&p| p < range.end)
}

/// Representative character for an entity reference
fn entity_char(name: &str) -> char {
    if name == "nbsp" {
        return ' ';
    }
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => numeric.parse().ok(),
        };
        return code.and_then(char::from_u32).unwrap_or('?');
    }
    resolve_predefined_entity(name)
        .and_then(|s| s.chars().next())
        .unwrap_or('?')
}

fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}
