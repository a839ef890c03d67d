//! Pagination data model
//!
//! Values produced by analysis and pagination. All of them are immutable
//! once produced: a recalculation supersedes them wholesale.

use core::fmt;

use crate::settings::PageCalculationSettings;

/// Structural category of a [`SemanticElement`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    /// `h1`..`h6`
    Heading,
    /// `p` and leaf text containers (`div`, `section`, ...)
    Paragraph,
    /// `img`, `figure`, `picture`
    Image,
    /// `table`
    Table,
    /// `blockquote`
    Quote,
    /// `li`
    List,
    /// `pre`, standalone `code`
    Code,
}

impl ElementType {
    /// Lowercase name used in ids and diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Heading => "heading",
            ElementType::Paragraph => "paragraph",
            ElementType::Image => "image",
            ElementType::Table => "table",
            ElementType::Quote => "quote",
            ElementType::List => "list",
            ElementType::Code => "code",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural content unit found by the analyzer.
#[derive(Clone, Debug, PartialEq)]
pub struct SemanticElement {
    /// Structural category
    pub element_type: ElementType,
    /// Heading depth 1-6, headings only
    pub level: Option<u8>,
    /// Char offset in the flattened chapter text
    pub offset: usize,
    /// Length in chars of the element's text
    pub length: usize,
    /// Byte range of the element in the chapter markup
    pub source_range: core::ops::Range<usize>,
    /// Preview text, at most 200 chars
    pub content: String,
    /// Salience, 1-10
    pub importance: u8,
    /// Whether a page may start at this element
    pub can_break_before: bool,
    /// Whether a page may end right after this element
    pub can_break_after: bool,
    /// Source tag name
    pub tag: String,
}

/// Categorical content density
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Density {
    /// Sparse structure, long runs of prose
    Low,
    /// Typical prose
    #[default]
    Medium,
    /// Many short structural units
    High,
}

impl Density {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Density::Low => "low",
            Density::Medium => "medium",
            Density::High => "high",
        }
    }
}

/// Aggregate statistics over one chapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentMetrics {
    /// Total words
    pub word_count: usize,
    /// Total sentences
    pub sentence_count: usize,
    /// Paragraph-type elements
    pub paragraph_count: usize,
    /// Mean words per sentence
    pub average_words_per_sentence: f32,
    /// Mean sentences per paragraph
    pub average_sentences_per_paragraph: f32,
    /// Difficulty 1-10 derived from Flesch Reading Ease
    pub complexity_score: u8,
    /// Minutes at 250 WPM, rounded up
    pub estimated_reading_time: u32,
    /// Image elements
    pub image_count: usize,
    /// Table elements
    pub table_count: usize,
    /// Heading elements
    pub heading_count: usize,
    /// Element-to-word ratio class
    pub density: Density,
}

/// Category of a [`PageBreakPoint`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BreakPointType {
    /// After a semantic element of the given type
    Element(ElementType),
    /// Synthesized at a sentence end when no element boundary was in range
    SentenceBoundary,
}

impl BreakPointType {
    /// Lowercase name used in ids
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakPointType::Element(kind) => kind.as_str(),
            BreakPointType::SentenceBoundary => "sentence",
        }
    }
}

/// A candidate page boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct PageBreakPoint {
    /// Stable id derived from type and offset
    pub id: String,
    /// Category
    pub break_type: BreakPointType,
    /// Byte offset in the chapter markup where the break occurs
    pub offset: usize,
    /// Desirability, 1-10
    pub priority: u8,
    /// Human-readable explanation for diagnostics
    pub semantic_context: String,
}

impl PageBreakPoint {
    /// Build a break point with its derived id
    pub fn new(
        break_type: BreakPointType,
        offset: usize,
        priority: u8,
        semantic_context: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}-{}", break_type.as_str(), offset),
            break_type,
            offset,
            priority: priority.clamp(1, 10),
            semantic_context: semantic_context.into(),
        }
    }
}

/// Everything the analyzer learns about a chapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentAnalysis {
    /// Candidates sorted by priority desc, then offset asc
    pub break_points: Vec<PageBreakPoint>,
    /// Elements in document order
    pub semantic_elements: Vec<SemanticElement>,
    /// Aggregate statistics
    pub content_metrics: ContentMetrics,
    /// Ease of pagination, 1-10
    pub readability_score: u8,
}

/// A materialized page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageInfo {
    /// `page-<chapter>-<page>`
    pub id: String,
    /// 0-based within the chapter
    pub page_number: usize,
    /// 0-based across the book
    pub global_page_number: usize,
    /// Inclusive start byte offset in the chapter markup
    pub start_offset: usize,
    /// Exclusive end byte offset
    pub end_offset: usize,
    /// Words on the page
    pub word_count: usize,
    /// Minutes at 250 WPM, rounded up
    pub estimated_read_time: u32,
    /// Page contains an `<img>`
    pub has_images: bool,
    /// Page contains a `<table>`
    pub has_tables: bool,
    /// Word-count class
    pub content_density: Density,
    /// Quality of the page's ending boundary, 1-10
    pub break_quality: u8,
}

impl PageInfo {
    /// Byte range of the page in the chapter markup
    pub fn range(&self) -> core::ops::Range<usize> {
        self.start_offset..self.end_offset
    }
}

/// Kind of pagination defect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Page is a single overlong line
    Orphan,
    /// Short trailing fragment on the final page
    Widow,
    /// Break falls inside an element that should stay whole
    SplitElement,
    /// Page size far from target
    UnevenPages,
    /// Low-quality boundary
    PoorBreak,
}

impl IssueKind {
    /// Kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Orphan => "orphan",
            IssueKind::Widow => "widow",
            IssueKind::SplitElement => "split-element",
            IssueKind::UnevenPages => "uneven-pages",
            IssueKind::PoorBreak => "poor-break",
        }
    }
}

/// Severity of a [`PageBreakIssue`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Cosmetic
    Low,
    /// Noticeable
    Medium,
    /// Should be fixed by optimization
    High,
}

impl Severity {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// A non-fatal pagination defect.
#[derive(Clone, Debug, PartialEq)]
pub struct PageBreakIssue {
    /// Defect kind
    pub kind: IssueKind,
    /// Page (0-based within the chapter) the defect belongs to
    pub page_number: usize,
    /// Byte offset of the offending boundary
    pub offset: usize,
    /// Severity
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
}

/// Output of one `generate_optimal_pages` run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageBreakResult {
    /// Contiguous, gapless pages
    pub pages: Vec<PageInfo>,
    /// Sum of page break qualities
    pub total_quality_score: f32,
    /// Mean page break quality
    pub average_quality_score: f32,
    /// Unresolved defects
    pub problematic_breaks: Vec<PageBreakIssue>,
    /// Advice derived from defect frequencies
    pub optimization_suggestions: Vec<String>,
    /// Optimization iterations that ran
    pub iterations: u8,
}

impl PageBreakResult {
    /// Count of unresolved high-severity defects
    pub fn high_severity_count(&self) -> usize {
        self.problematic_breaks
            .iter()
            .filter(|issue| issue.severity == Severity::High)
            .count()
    }
}

/// Per-chapter pagination result held by the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct PageBreakMap {
    /// Chapter index in the spine
    pub chapter_index: usize,
    /// Ordered pages
    pub pages: Vec<PageInfo>,
    /// Raw candidates the pages were chosen from
    pub break_points: Vec<PageBreakPoint>,
    /// Milliseconds since the Unix epoch
    pub last_calculated: u64,
    /// Settings snapshot used to produce the map
    pub settings: PageCalculationSettings,
    /// Mean break quality of `pages`
    pub average_quality: f32,
}

impl PageBreakMap {
    /// Number of pages in the chapter
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page holding markup byte `offset`, clamped to the last page
    pub fn page_for_offset(&self, offset: usize) -> Option<&PageInfo> {
        let idx = self.pages.partition_point(|page| page.end_offset <= offset);
        self.pages.get(idx).or_else(|| self.pages.last())
    }

    /// Copy with global page numbers starting at `global_offset`
    pub fn restamped(&self, global_offset: usize) -> Self {
        let mut map = self.clone();
        for page in &mut map.pages {
            page.global_page_number = global_offset + page.page_number;
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: usize, start: usize, end: usize) -> PageInfo {
        PageInfo {
            id: format!("page-0-{}", number),
            page_number: number,
            global_page_number: number,
            start_offset: start,
            end_offset: end,
            word_count: 0,
            estimated_read_time: 0,
            has_images: false,
            has_tables: false,
            content_density: Density::Low,
            break_quality: 8,
        }
    }

    fn map() -> PageBreakMap {
        PageBreakMap {
            chapter_index: 2,
            pages: vec![page(0, 0, 10), page(1, 10, 25)],
            break_points: Vec::new(),
            last_calculated: 0,
            settings: PageCalculationSettings::default(),
            average_quality: 8.0,
        }
    }

    #[test]
    fn test_break_point_id_and_clamp() {
        let bp = PageBreakPoint::new(BreakPointType::Element(ElementType::Heading), 42, 14, "h1");
        assert_eq!(bp.id, "heading-42");
        assert_eq!(bp.priority, 10);
        let sentence = PageBreakPoint::new(BreakPointType::SentenceBoundary, 7, 0, "");
        assert_eq!(sentence.id, "sentence-7");
        assert_eq!(sentence.priority, 1);
    }

    #[test]
    fn test_page_for_offset() {
        let map = map();
        assert_eq!(map.page_for_offset(0).unwrap().page_number, 0);
        assert_eq!(map.page_for_offset(9).unwrap().page_number, 0);
        assert_eq!(map.page_for_offset(10).unwrap().page_number, 1);
        assert_eq!(map.page_for_offset(999).unwrap().page_number, 1);
    }

    #[test]
    fn test_restamped_shifts_global_numbers() {
        let map = map().restamped(40);
        assert_eq!(map.pages[0].global_page_number, 40);
        assert_eq!(map.pages[1].global_page_number, 41);
        assert_eq!(map.pages[1].page_number, 1);
    }

    #[test]
    fn test_issue_names() {
        assert_eq!(IssueKind::SplitElement.as_str(), "split-element");
        assert_eq!(IssueKind::UnevenPages.as_str(), "uneven-pages");
        assert!(Severity::High > Severity::Medium);
    }
}
