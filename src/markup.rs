//! Lenient XHTML/HTML tree walk for chapter content
//!
//! Converts chapter markup into a flat list of element nodes in document
//! order, each carrying its full descendant text, its position in the
//! flattened text stream, and its byte range in the source markup. Uses
//! quick_xml for SAX-style parsing; unbalanced tags, HTML void elements and
//! unknown entities are tolerated rather than reported.

use core::ops::Range;

use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Parse errors tolerated before the walk gives up on the rest of a chapter.
pub(crate) const MAX_PARSE_ERRORS: usize = 16;

/// One element of the walked tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkupNode {
    /// Lowercased local tag name
    pub tag: String,
    /// Values of the `class` attribute
    pub classes: Vec<String>,
    /// `alt` attribute (images)
    pub alt: Option<String>,
    /// Index of the parent node in [`MarkupDocument::nodes`]
    pub parent: Option<usize>,
    /// Nesting depth, 0 for top-level elements
    pub depth: usize,
    /// Whitespace-normalized text of the element and all descendants
    pub text: String,
    /// Char offset of `text` in [`MarkupDocument::text`]
    pub text_offset: usize,
    /// Length of `text` in chars
    pub text_len: usize,
    /// Byte range of the element in the source markup, close tag included
    pub source_range: Range<usize>,
    /// Whether any block-level element is nested inside this one
    pub has_block_descendant: bool,
}

impl MarkupNode {
    /// Check whether this element's tag is block-level
    pub fn is_block(&self) -> bool {
        is_block_tag(&self.tag)
    }

    /// Heading level for `h1`..`h6`
    pub fn heading_level(&self) -> Option<u8> {
        heading_level(&self.tag)
    }

    /// Check a simple selector: `tag`, `.class` or `tag.class`
    pub fn matches_selector(&self, selector: &str) -> bool {
        let selector = selector.trim();
        match selector.split_once('.') {
            Some((tag, class)) => {
                (tag.is_empty() || tag.eq_ignore_ascii_case(&self.tag))
                    && self.classes.iter().any(|c| c == class)
            }
            None => !selector.is_empty() && selector.eq_ignore_ascii_case(&self.tag),
        }
    }
}

/// Result of walking one chapter's markup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkupDocument {
    /// Elements in document (pre-)order
    pub nodes: Vec<MarkupNode>,
    /// Flattened, whitespace-normalized text of the whole chapter
    pub text: String,
}

impl MarkupDocument {
    /// Text blocks that carry no nested block of their own.
    ///
    /// Falls back to the whole chapter text when the markup has no block
    /// structure at all.
    pub fn leaf_blocks(&self) -> Vec<&str> {
        let blocks: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.is_block() && !n.has_block_descendant && !n.text.is_empty())
            .map(|n| n.text.as_str())
            .collect();
        if blocks.is_empty() && !self.text.is_empty() {
            vec![self.text.as_str()]
        } else {
            blocks
        }
    }

    /// Number of elements with the given tag
    pub fn count_tag(&self, tag: &str) -> usize {
        self.nodes.iter().filter(|n| n.tag == tag).count()
    }

    /// Check whether `node` sits inside an element matching `pred`
    pub fn has_ancestor<F>(&self, node: &MarkupNode, pred: F) -> bool
    where
        F: Fn(&MarkupNode) -> bool,
    {
        let mut parent = node.parent;
        while let Some(idx) = parent {
            let ancestor = &self.nodes[idx];
            if pred(ancestor) {
                return true;
            }
            parent = ancestor.parent;
        }
        false
    }
}

/// An element that has been opened but not yet closed
struct OpenElement {
    node: usize,
    text_byte_start: usize,
    text_char_start: usize,
}

struct Walker {
    doc: MarkupDocument,
    stack: Vec<OpenElement>,
    text_chars: usize,
    skip_depth: usize,
}

impl Walker {
    fn new(capacity: usize) -> Self {
        Self {
            doc: MarkupDocument {
                nodes: Vec::new(),
                text: String::with_capacity(capacity),
            },
            stack: Vec::with_capacity(32),
            text_chars: 0,
            skip_depth: 0,
        }
    }

    fn push_text(&mut self, text: &str) {
        let mut text = collapse_whitespace(text);
        if text.starts_with(' ') && (self.doc.text.is_empty() || self.doc.text.ends_with(' ')) {
            text.remove(0);
        }
        self.text_chars += text.chars().count();
        self.doc.text.push_str(&text);
    }

    fn push_separator(&mut self) {
        if !self.doc.text.is_empty() && !self.doc.text.ends_with(' ') {
            self.doc.text.push(' ');
            self.text_chars += 1;
        }
    }

    fn open(&mut self, e: &BytesStart, name: String, source_start: usize) {
        let block = is_block_tag(&name);
        if block {
            self.push_separator();
            for open in &self.stack {
                self.doc.nodes[open.node].has_block_descendant = true;
            }
        }
        let classes = get_attribute(e, "class")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let alt = get_attribute(e, "alt");
        let node = MarkupNode {
            tag: name,
            classes,
            alt,
            parent: self.stack.last().map(|open| open.node),
            depth: self.stack.len(),
            text: String::new(),
            text_offset: self.text_chars,
            text_len: 0,
            source_range: source_start..source_start,
            has_block_descendant: false,
        };
        self.doc.nodes.push(node);
        self.stack.push(OpenElement {
            node: self.doc.nodes.len() - 1,
            text_byte_start: self.doc.text.len(),
            text_char_start: self.text_chars,
        });
    }

    fn close_top(&mut self, source_end: usize) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let raw = &self.doc.text[open.text_byte_start..];
        // Leading separators are ASCII spaces, so bytes == chars here.
        let lead = raw.len() - raw.trim_start().len();
        let text = raw.trim().to_string();
        let node = &mut self.doc.nodes[open.node];
        node.text_offset = open.text_char_start + lead;
        node.text_len = text.chars().count();
        node.text = text;
        node.source_range.end = source_end;
        if is_block_tag(&node.tag) {
            self.push_separator();
        }
    }

    /// Close elements up to and including the innermost `name`.
    ///
    /// Stray end tags with no matching open element are ignored.
    fn close(&mut self, name: &str, source_end: usize) {
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|open| self.doc.nodes[open.node].tag == name)
        else {
            return;
        };
        while self.stack.len() > pos {
            self.close_top(source_end);
        }
    }

    fn finish(mut self, source_len: usize) -> MarkupDocument {
        while !self.stack.is_empty() {
            self.close_top(source_len);
        }
        let trimmed = self.doc.text.trim_end().len();
        self.doc.text.truncate(trimmed);
        self.doc
    }
}

/// Walk chapter markup into a [`MarkupDocument`].
///
/// Never fails: unparseable fragments are logged and skipped, and after
/// repeated errors the remainder of the chapter is dropped.
///
/// # Example
/// ```
/// use mu_pager::markup::walk_markup;
///
/// let doc = walk_markup("<h1>Title</h1><p>Hello <em>world</em></p>");
/// assert_eq!(doc.text, "Title Hello world");
/// assert_eq!(doc.nodes[0].tag, "h1");
/// ```
pub fn walk_markup(html: &str) -> MarkupDocument {
    let mut reader = lenient_reader(html);

    let mut buf = Vec::new();
    let mut walker = Walker::new(html.len());
    let mut errors = 0usize;
    let mut last_error_position = None;

    loop {
        let event_start = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if should_skip_element(&name) {
                    walker.skip_depth += 1;
                } else if walker.skip_depth == 0 {
                    walker.open(&e, name.clone(), event_start);
                    if is_void_tag(&name) {
                        walker.close_top(reader.buffer_position() as usize);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if walker.skip_depth == 0 {
                    let name = local_name(&e);
                    walker.open(&e, name, event_start);
                    walker.close_top(reader.buffer_position() as usize);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                if should_skip_element(&name) {
                    walker.skip_depth = walker.skip_depth.saturating_sub(1);
                } else if walker.skip_depth == 0 {
                    walker.close(&name, reader.buffer_position() as usize);
                }
            }
            Ok(Event::Text(e)) => {
                if walker.skip_depth == 0 {
                    match e.decode() {
                        Ok(text) => walker.push_text(&text),
                        Err(err) => log::debug!("skipping undecodable text: {:?}", err),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if walker.skip_depth == 0 {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    walker.push_text(&text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if walker.skip_depth == 0 {
                    if let Ok(entity_name) = e.decode() {
                        let entity = format!("&{};", entity_name);
                        match unescape_with(&entity, resolve_entity) {
                            Ok(resolved) => walker.push_text(&resolved),
                            Err(err) => log::debug!("skipping entity {}: {:?}", entity, err),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {
                // Comments, declarations, PIs and DOCTYPE carry no content
            }
            Err(err) => {
                let position = reader.buffer_position();
                log::debug!("markup error at byte {}: {:?}", position, err);
                errors += 1;
                if errors > MAX_PARSE_ERRORS || last_error_position == Some(position) {
                    log::debug!("abandoning markup walk after {} errors", errors);
                    break;
                }
                last_error_position = Some(position);
            }
        }
        buf.clear();
    }

    walker.finish(html.len())
}

/// Reader tuned for chapter markup found in the wild: whitespace kept,
/// end tags unchecked, stray `&` treated as text.
pub(crate) fn lenient_reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = false;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;
    reader
}

/// Predefined XML entities plus the HTML ones that show up in EPUB prose.
fn resolve_entity(entity: &str) -> Option<&'static str> {
    resolve_predefined_entity(entity).or(match entity {
        "nbsp" => Some("\u{a0}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "shy" => Some(""),
        _ => None,
    })
}

/// Elements skipped entirely, with their children
pub fn should_skip_element(name: &str) -> bool {
    matches!(
        name,
        "script" | "style" | "head" | "noscript" | "template" | "title"
    )
}

/// Elements that never have content or a close tag in HTML
pub fn is_void_tag(name: &str) -> bool {
    matches!(
        name,
        "img"
            | "br"
            | "hr"
            | "meta"
            | "link"
            | "input"
            | "source"
            | "wbr"
            | "area"
            | "col"
            | "embed"
            | "param"
            | "track"
            | "base"
    )
}

/// Block-level elements: these separate words and form text blocks
pub fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "aside"
            | "blockquote"
            | "figure"
            | "figcaption"
            | "picture"
            | "table"
            | "thead"
            | "tbody"
            | "tfoot"
            | "tr"
            | "td"
            | "th"
            | "caption"
            | "ul"
            | "ol"
            | "li"
            | "dl"
            | "dt"
            | "dd"
            | "pre"
            | "hr"
            | "br"
            | "body"
            | "main"
            | "header"
            | "footer"
            | "nav"
    ) || heading_level(name).is_some()
}

/// Heading level for `h1`..`h6`
pub fn heading_level(name: &str) -> Option<u8> {
    let bytes = name.as_bytes();
    if bytes.len() == 2 && bytes[0] == b'h' && (b'1'..=b'6').contains(&bytes[1]) {
        Some(bytes[1] - b'0')
    } else {
        None
    }
}

/// Collapse whitespace runs to single spaces, keeping one space at the ends
fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;
    for ch in text.chars() {
        // Non-breaking spaces stay: they glue words together
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

/// Extract a named attribute value from a start/empty element
fn get_attribute(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()) {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = unescape_with(&raw, resolve_entity)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            return Some(value);
        }
    }
    None
}
