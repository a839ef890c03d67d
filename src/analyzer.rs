//! Structural content analysis
//!
//! Walks chapter markup, classifies semantic elements (headings,
//! paragraphs, images, tables, quotes, list items, code), scores their
//! salience and derives ranked page-break candidates from them.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{heading_level, walk_markup, MarkupDocument, MarkupNode};
use crate::model::{
    BreakPointType, ContentAnalysis, ContentMetrics, Density, ElementType, PageBreakPoint,
    SemanticElement,
};
use crate::readability::{
    complexity_from_flesch, count_sentences, count_words, reading_time_minutes, TextStatistics,
};
use crate::settings::SmartPageBreakOptions;

/// Longest preview kept in [`SemanticElement::content`]
pub const PREVIEW_CHARS: usize = 200;

/// Candidates below this rounded priority are dropped
const MIN_BREAK_PRIORITY: u8 = 3;

const TRANSITION_OPENERS: &[&str] = &["however", "moreover", "furthermore", "meanwhile", "consequently"];

static LIST_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\.|[a-z]\))").expect("static regex"));

/// Converts chapter markup into semantic elements, metrics and break candidates.
#[derive(Clone, Debug, Default)]
pub struct ContentAnalyzer {
    options: SmartPageBreakOptions,
}

impl ContentAnalyzer {
    /// Create an analyzer honoring the given `respect_*` flags and selectors
    pub fn new(options: SmartPageBreakOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &SmartPageBreakOptions {
        &self.options
    }

    /// Analyze one chapter's markup.
    ///
    /// Never fails: malformed fragments are skipped, and empty content gives
    /// empty elements and break points.
    pub fn analyze_content(&self, html: &str) -> ContentAnalysis {
        let doc = walk_markup(html);
        let elements = self.extract_elements(&doc);
        let metrics = calculate_metrics(&doc, &elements);
        let break_points = self.generate_break_points(&doc, &elements, &metrics);
        let readability_score = readability_score(&metrics, &elements);

        log::debug!(
            "analyzed {} bytes: {} elements, {} break points, {} words ({:?} density)",
            html.len(),
            elements.len(),
            break_points.len(),
            metrics.word_count,
            metrics.density
        );

        ContentAnalysis {
            break_points,
            semantic_elements: elements.into_iter().map(|(el, _)| el).collect(),
            content_metrics: metrics,
            readability_score,
        }
    }

    /// Elements in document order, each paired with its node index
    fn extract_elements(&self, doc: &MarkupDocument) -> Vec<(SemanticElement, usize)> {
        doc.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| self.classify(doc, node).map(|el| (el, idx)))
            .collect()
    }

    fn classify(&self, doc: &MarkupDocument, node: &MarkupNode) -> Option<SemanticElement> {
        // Text blocks and atomic elements own everything nested inside them.
        if doc.has_ancestor(node, |a| owns_descendants(&a.tag)) {
            return None;
        }

        let opts = &self.options;
        let text = node.text.trim();
        let level = node.heading_level();
        let element_type = match node.tag.as_str() {
            _ if level.is_some() => ElementType::Heading,
            "p" => ElementType::Paragraph,
            "div" | "section" | "article" | "aside" if !node.has_block_descendant => {
                ElementType::Paragraph
            }
            "img" | "figure" | "picture" => ElementType::Image,
            "table" => ElementType::Table,
            "blockquote" => ElementType::Quote,
            "li" => ElementType::List,
            "pre" | "code" => ElementType::Code,
            _ => return None,
        };
        if element_type != ElementType::Image && text.chars().count() < 3 {
            return None;
        }

        let (importance, can_break_before, can_break_after) = match element_type {
            ElementType::Heading => (10 - level.unwrap_or(1), true, true),
            ElementType::Paragraph => (
                paragraph_importance(text),
                paragraph_can_break_before(text),
                paragraph_can_break_after(text, opts.respect_sentences),
            ),
            ElementType::Image => (8, opts.respect_images, true),
            ElementType::Table => (8, opts.respect_tables, opts.respect_tables),
            ElementType::Quote => (7, opts.respect_quotes, opts.respect_quotes),
            ElementType::List => (6, true, true),
            ElementType::Code => (7, opts.respect_code_blocks, opts.respect_code_blocks),
        };

        let content = if element_type == ElementType::Image && text.is_empty() {
            node.alt.clone().unwrap_or_else(|| "[image]".to_string())
        } else {
            text.chars().take(PREVIEW_CHARS).collect()
        };

        Some(SemanticElement {
            element_type,
            level,
            offset: node.text_offset,
            length: node.text_len,
            source_range: node.source_range.clone(),
            content,
            importance,
            can_break_before,
            can_break_after,
            tag: node.tag.clone(),
        })
    }

    fn generate_break_points(
        &self,
        doc: &MarkupDocument,
        elements: &[(SemanticElement, usize)],
        metrics: &ContentMetrics,
    ) -> Vec<PageBreakPoint> {
        let mut seen = HashSet::new();
        let mut points = Vec::new();

        for (i, (el, node_idx)) in elements.iter().enumerate() {
            let prev = i.checked_sub(1).map(|p| &elements[p].0);
            let next = elements.get(i + 1).map(|(n, _)| n);
            if !el.can_break_after || next.is_some_and(|n| !n.can_break_before) {
                continue;
            }

            let node = &doc.nodes[*node_idx];
            let mut priority = el.importance as f32;
            if self
                .options
                .preferred_break_elements
                .iter()
                .any(|selector| node.matches_selector(selector))
            {
                priority += 2.0;
            }
            priority += context_boost(el, prev, next);
            if el.element_type == ElementType::Paragraph {
                match metrics.density {
                    Density::High => priority += 1.0,
                    Density::Low => priority -= 1.0,
                    Density::Medium => {}
                }
            }

            let rounded = priority.round().clamp(1.0, 10.0) as u8;
            if rounded < MIN_BREAK_PRIORITY {
                continue;
            }
            let break_type = BreakPointType::Element(el.element_type);
            let offset = el.source_range.end;
            if !seen.insert((offset, break_type)) {
                continue;
            }
            let preview: String = el.content.chars().take(40).collect();
            points.push(PageBreakPoint::new(
                break_type,
                offset,
                rounded,
                format!("after {} \"{}\"", el.element_type, preview),
            ));
        }

        points.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.offset.cmp(&b.offset)));
        points
    }
}

/// Analyze markup with default options.
pub fn analyze_content(html: &str) -> ContentAnalysis {
    ContentAnalyzer::default().analyze_content(html)
}

fn owns_descendants(tag: &str) -> bool {
    heading_level(tag).is_some()
        || matches!(
            tag,
            "p" | "li" | "blockquote" | "table" | "pre" | "figure" | "picture"
        )
}

fn context_boost(
    el: &SemanticElement,
    prev: Option<&SemanticElement>,
    next: Option<&SemanticElement>,
) -> f32 {
    let mut boost = 0.0;
    for neighbor in [prev, next].into_iter().flatten() {
        if neighbor.element_type == ElementType::Heading {
            boost += 1.0;
        }
        if neighbor.element_type != el.element_type {
            boost += 0.5;
        }
    }
    let pairs_with_image = [prev, next].into_iter().flatten().any(|n| {
        matches!(
            (el.element_type, n.element_type),
            (ElementType::Paragraph, ElementType::Image) | (ElementType::Image, ElementType::Paragraph)
        )
    });
    if pairs_with_image {
        boost += 1.0;
    }
    boost
}

/// Salience of a paragraph from its length and shape
fn paragraph_importance(text: &str) -> u8 {
    let words = count_words(text);
    let mut importance: i32 = 5;
    if words < 20 {
        importance += 2;
    }
    if words > 100 {
        importance -= 1;
    }
    if words > 5 && count_sentences(text) == 1 {
        importance += 1;
    }
    let opener = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if TRANSITION_OPENERS.contains(&opener.as_str()) {
        importance += 1;
    }
    if matches!(last_significant_char(text), Some('!' | '?')) {
        importance += 1;
    }
    importance.clamp(1, 10) as u8
}

fn paragraph_can_break_after(text: &str, respect_sentences: bool) -> bool {
    if count_words(text) < 3 {
        return false;
    }
    !respect_sentences || matches!(last_significant_char(text), Some('.' | '!' | '?' | ':' | ';'))
}

fn paragraph_can_break_before(text: &str) -> bool {
    !opens_unclosed_quote(text) && !LIST_CONTINUATION.is_match(text)
}

/// A paragraph continuing dialogue from the previous one opens a quote it never closes
fn opens_unclosed_quote(text: &str) -> bool {
    match text.chars().next() {
        Some('"') => text.matches('"').count() % 2 == 1,
        Some('\u{201c}') => !text.contains('\u{201d}'),
        _ => false,
    }
}

/// Last char ignoring trailing whitespace, closing quotes and brackets
pub(crate) fn last_significant_char(text: &str) -> Option<char> {
    text.trim_end()
        .trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')', ']'])
        .chars()
        .last()
}

fn calculate_metrics(doc: &MarkupDocument, elements: &[(SemanticElement, usize)]) -> ContentMetrics {
    let stats = TextStatistics::from_text(&doc.text);
    let count = |kind: ElementType| elements.iter().filter(|(el, _)| el.element_type == kind).count();
    let paragraph_count = count(ElementType::Paragraph);

    let complexity_score = if stats.words == 0 {
        1
    } else {
        complexity_from_flesch(stats.flesch_reading_ease())
    };

    let density = if stats.words == 0 {
        Density::Low
    } else {
        let ratio = elements.len() as f32 / stats.words as f32;
        if ratio > 0.1 {
            Density::High
        } else if ratio < 0.02 {
            Density::Low
        } else {
            Density::Medium
        }
    };

    ContentMetrics {
        word_count: stats.words,
        sentence_count: stats.sentences,
        paragraph_count,
        average_words_per_sentence: stats.avg_words_per_sentence(),
        average_sentences_per_paragraph: if paragraph_count == 0 {
            0.0
        } else {
            stats.sentences as f32 / paragraph_count as f32
        },
        complexity_score,
        estimated_reading_time: reading_time_minutes(stats.words),
        image_count: count(ElementType::Image),
        table_count: count(ElementType::Table),
        heading_count: count(ElementType::Heading),
        density,
    }
}

/// How easy the chapter is to paginate, 1-10
fn readability_score(metrics: &ContentMetrics, elements: &[(SemanticElement, usize)]) -> u8 {
    let mut score: i32 = 5;
    if metrics.complexity_score > 7 {
        score -= 1;
    } else if metrics.complexity_score < 4 {
        score += 1;
    }
    match metrics.density {
        Density::High => score -= 1,
        Density::Low => score += 1,
        Density::Medium => {}
    }
    let kinds: HashSet<ElementType> = elements.iter().map(|(el, _)| el.element_type).collect();
    if kinds.len() >= 3 {
        score -= 1;
    } else if kinds.len() <= 1 {
        score += 1;
    }
    score.clamp(1, 10) as u8
}
