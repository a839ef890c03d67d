//! Smart page breaking for a single chapter
//!
//! [`SmartPageBreaker`] turns chapter markup plus its [`ContentAnalysis`]
//! into a gapless run of [`PageInfo`] records. A baseline pass walks the
//! markup and ends pages at block boundaries once a word target is reached;
//! where no clean boundary exists, a break is refined from the analyzer's
//! candidates and validated. A bounded optimization loop then reworks weak
//! pages and keeps the best result it has seen.
//!
//! All offsets are byte offsets into the chapter markup.

use core::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::analyzer::last_significant_char;
use crate::model::{
    BreakPointType, ContentAnalysis, Density, IssueKind, PageBreakIssue, PageBreakPoint,
    PageBreakResult, PageInfo, Severity,
};
use crate::page_scan::{Boundary, PageScan, ProtectedKind};
use crate::readability::reading_time_minutes;
use crate::settings::{
    PageBreakOptimizationOptions, PageCalculationSettings, SmartPageBreakOptions,
    ViewportDimensions,
};

/// Hard cap on pages produced for one chapter.
pub const MAX_PAGES_PER_CHAPTER: usize = 1000;

/// Words per page on the reference screen with default typography.
pub const BASE_WORDS_PER_PAGE: f32 = 300.0;

/// Upper bound on the computed target, whatever the options allow.
pub const TARGET_WORDS_CEILING: usize = 450;

/// How far, in bytes, the sentence fallback searches around an ideal offset.
const SENTENCE_SEARCH_RADIUS: usize = 100;

/// How far, in bytes, a mid-word break may move to reach a space.
const SNAP_RADIUS: usize = 20;

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[.!?\u{2026}]+[\"'\u{201d}\u{2019})\\]]*\\s").expect("static regex")
});

/// Progress of a single [`SmartPageBreaker::generate_optimal_pages_observed`] run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Scanning markup and computing the word target
    Analyzing,
    /// Baseline pages exist
    BaselinePaginated,
    /// Running optimization pass `n` (1-based)
    Optimizing(u8),
    /// Result is final
    Finalized,
}

/// How a page's end boundary was chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundaryKind {
    /// Close tag of a block element
    Structural,
    /// End of chapter
    End,
    /// An analyzer break point (or synthesized sentence end) with this priority
    Refined(u8),
    /// No candidate fit; scored from local text context
    Forced(u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PageDraft {
    start: usize,
    end: usize,
    kind: BoundaryKind,
    /// Mid-word break that could not be moved to a space
    unsnapped: bool,
}

impl PageDraft {
    fn new(start: usize, end: usize, kind: BoundaryKind) -> Self {
        Self {
            start,
            end,
            kind,
            unsnapped: false,
        }
    }

    fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    fn is_chosen_break(&self) -> bool {
        matches!(self.kind, BoundaryKind::Refined(_) | BoundaryKind::Forced(_))
    }
}

/// Per-chapter inputs shared by every pass
struct Layout<'a> {
    content: &'a str,
    scan: PageScan,
    break_points: &'a [PageBreakPoint],
    target: usize,
}

impl Layout<'_> {
    fn words(&self, draft: &PageDraft) -> usize {
        self.scan.words_in(draft.range())
    }
}

#[derive(Clone, Debug)]
struct Evaluation {
    drafts: Vec<PageDraft>,
    qualities: Vec<u8>,
    issues: Vec<PageBreakIssue>,
    average: f32,
}

impl Evaluation {
    fn has_high_severity(&self) -> bool {
        self.issues.iter().any(|issue| issue.severity == Severity::High)
    }

    fn beats(&self, other: &Evaluation) -> bool {
        self.average > other.average
            || (self.average == other.average && self.issues.len() < other.issues.len())
    }
}

/// Chapter paginator.
///
/// # Example
/// ```
/// use mu_pager::analyzer::ContentAnalyzer;
/// use mu_pager::breaker::SmartPageBreaker;
/// use mu_pager::settings::{PageCalculationSettings, SmartPageBreakOptions};
///
/// let html = format!("<p>{}</p>", "word ".repeat(50));
/// let options = SmartPageBreakOptions::default().with_word_range(100, 400);
/// let analysis = ContentAnalyzer::new(options.clone()).analyze_content(&html);
/// let breaker = SmartPageBreaker::new(PageCalculationSettings::default(), options, None);
/// let result = breaker.generate_optimal_pages(&html, &analysis, 0, 0);
/// assert_eq!(result.pages.len(), 1);
/// assert_eq!(result.pages[0].break_quality, 10);
/// ```
#[derive(Clone, Debug)]
pub struct SmartPageBreaker {
    settings: PageCalculationSettings,
    options: SmartPageBreakOptions,
    optimization: PageBreakOptimizationOptions,
    break_frequency: f32,
}

impl SmartPageBreaker {
    /// Create a breaker; `optimization` defaults when `None`.
    pub fn new(
        settings: PageCalculationSettings,
        options: SmartPageBreakOptions,
        optimization: Option<PageBreakOptimizationOptions>,
    ) -> Self {
        Self {
            settings,
            options,
            optimization: optimization.unwrap_or_default(),
            break_frequency: 1.0,
        }
    }

    /// Scale how often pages break (>1 gives shorter pages), clamped to 0.5-2.0.
    pub fn with_break_frequency(mut self, break_frequency: f32) -> Self {
        self.break_frequency = if break_frequency.is_finite() {
            break_frequency.clamp(0.5, 2.0)
        } else {
            1.0
        };
        self
    }

    /// Settings in use
    pub fn settings(&self) -> &PageCalculationSettings {
        &self.settings
    }

    /// Break options in use
    pub fn options(&self) -> &SmartPageBreakOptions {
        &self.options
    }

    /// Words per page the baseline pass aims for.
    pub fn target_words_per_page(&self, analysis: &ContentAnalysis) -> usize {
        let area_ratio = self.settings.page_area() / ViewportDimensions::REFERENCE.area();
        let scale = (area_ratio.sqrt() * self.settings.typography_factor()).clamp(0.7, 1.3);
        let mut target = BASE_WORDS_PER_PAGE * scale;

        let metrics = &analysis.content_metrics;
        if metrics.complexity_score > 7 {
            target *= 0.8;
        } else if metrics.complexity_score < 4 {
            target *= 1.1;
        }
        match metrics.density {
            Density::High => target *= 0.9,
            Density::Low => target *= 1.1,
            Density::Medium => {}
        }
        target /= self.break_frequency;

        let max = self.options.maximum_words_per_page.min(TARGET_WORDS_CEILING);
        let min = self.options.minimum_words_per_page.min(max);
        (target.round() as usize).clamp(min, max).max(1)
    }

    /// Paginate one chapter.
    pub fn generate_optimal_pages(
        &self,
        content: &str,
        analysis: &ContentAnalysis,
        chapter_index: usize,
        global_page_offset: usize,
    ) -> PageBreakResult {
        self.generate_optimal_pages_observed(
            content,
            analysis,
            chapter_index,
            global_page_offset,
            &mut |_| {},
        )
    }

    /// Paginate one chapter, reporting state transitions to `observer`.
    pub fn generate_optimal_pages_observed(
        &self,
        content: &str,
        analysis: &ContentAnalysis,
        chapter_index: usize,
        global_page_offset: usize,
        observer: &mut dyn FnMut(BreakerState),
    ) -> PageBreakResult {
        observer(BreakerState::Analyzing);
        if content.trim().is_empty() {
            observer(BreakerState::BaselinePaginated);
            observer(BreakerState::Finalized);
            return PageBreakResult::default();
        }

        let layout = Layout {
            content,
            scan: PageScan::new(content),
            break_points: &analysis.break_points,
            target: self.target_words_per_page(analysis),
        };

        let baseline = self.evaluate(&layout, self.baseline(&layout));
        observer(BreakerState::BaselinePaginated);

        let mut best = baseline;
        let mut iterations = 0u8;
        if self.optimization.enable_advanced_optimization {
            while iterations < self.optimization.max_iterations && self.needs_work(&best) {
                iterations += 1;
                observer(BreakerState::Optimizing(iterations));
                let drafts = self.improve(&layout, &best);
                if drafts == best.drafts {
                    log::trace!("optimization pass {} changed nothing", iterations);
                    break;
                }
                let candidate = self.evaluate(&layout, drafts);
                log::trace!(
                    "optimization pass {}: average quality {:.2} -> {:.2}",
                    iterations,
                    best.average,
                    candidate.average
                );
                if candidate.beats(&best) {
                    best = candidate;
                } else {
                    break;
                }
            }
        }

        let result = self.assemble(&layout, best, chapter_index, global_page_offset, iterations);
        log::debug!(
            "chapter {}: {} pages, target {} words, average quality {:.2}, {} issues",
            chapter_index,
            result.pages.len(),
            layout.target,
            result.average_quality_score,
            result.problematic_breaks.len()
        );
        observer(BreakerState::Finalized);
        result
    }

    /// Best break point near `ideal_offset` for a page starting at `page_start`.
    ///
    /// Candidates from `break_points` within 40% of the page's span around
    /// the ideal are scored on proximity, priority and local context. When
    /// none qualifies, the nearest sentence end within 100 bytes is used as
    /// a synthesized candidate. Returns `None` when neither exists.
    pub fn find_optimal_break_point(
        &self,
        content: &str,
        page_start: usize,
        ideal_offset: usize,
        break_points: &[PageBreakPoint],
    ) -> Option<PageBreakPoint> {
        let scan = PageScan::new(content);
        self.refine(content, &scan, break_points, page_start, ideal_offset)
    }

    fn refine(
        &self,
        content: &str,
        scan: &PageScan,
        break_points: &[PageBreakPoint],
        page_start: usize,
        ideal: usize,
    ) -> Option<PageBreakPoint> {
        let min_words = self.options.minimum_words_per_page.max(1);
        let usable = |offset: usize| {
            offset > page_start
                && offset < content.len()
                && content.is_char_boundary(offset)
                && scan.words_in(page_start..offset) >= min_words
        };

        let window = ideal.saturating_sub(page_start) as f32 * 0.4;
        let best = break_points
            .iter()
            .filter(|bp| (bp.offset as f32 - ideal as f32).abs() <= window && usable(bp.offset))
            .map(|bp| {
                let distance = (bp.offset as f32 - ideal as f32).abs();
                let proximity = if window > 0.0 {
                    10.0 * (1.0 - distance / window)
                } else {
                    10.0
                };
                let score = 0.4 * proximity
                    + 0.4 * bp.priority as f32
                    + 0.2 * context_score(content, bp.offset);
                (bp, score)
            })
            .fold(None::<(&PageBreakPoint, f32)>, |best, (bp, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((bp, score)),
            });
        if let Some((bp, score)) = best {
            log::trace!("refined break at {} (score {:.2})", bp.offset, score);
            return Some(bp.clone());
        }

        if !self.options.respect_sentences {
            return None;
        }
        let lo = floor_char_boundary(content, ideal.saturating_sub(SENTENCE_SEARCH_RADIUS));
        let hi = ceil_char_boundary(content, ideal + SENTENCE_SEARCH_RADIUS);
        SENTENCE_END
            .find_iter(&content[lo..hi])
            .map(|m| lo + m.end())
            .filter(|&offset| !inside_tag(content, offset) && usable(offset))
            .min_by_key(|&offset| offset.abs_diff(ideal))
            .map(|offset| {
                let distance = offset.abs_diff(ideal) as f32;
                let priority = (8.0 - distance / SENTENCE_SEARCH_RADIUS as f32 * 6.0)
                    .round()
                    .clamp(2.0, 8.0) as u8;
                PageBreakPoint::new(
                    BreakPointType::SentenceBoundary,
                    offset,
                    priority,
                    "sentence end near ideal offset",
                )
            })
    }

    fn baseline(&self, layout: &Layout<'_>) -> Vec<PageDraft> {
        let len = layout.scan.len();
        let mut drafts = Vec::new();
        let mut start = 0usize;

        loop {
            if drafts.len() + 1 >= MAX_PAGES_PER_CHAPTER {
                log::warn!(
                    "page cap of {} reached; remaining content joins the last page",
                    MAX_PAGES_PER_CHAPTER
                );
                break;
            }
            if layout.scan.words_from(start) <= layout.target {
                break;
            }
            let ideal = layout.scan.offset_after_words(start, layout.target);
            let draft = match self.structural_break(layout, start, ideal, len) {
                Some(end) => PageDraft::new(start, end, BoundaryKind::Structural),
                None => self.forced_break(layout, start, ideal),
            };
            if draft.end >= len || layout.scan.words_from(draft.end) == 0 {
                break;
            }
            start = draft.end;
            drafts.push(draft);
        }

        drafts.push(PageDraft::new(start, len, BoundaryKind::End));
        drafts
    }

    /// Last clean block boundary before `ideal` leaving at least the minimum
    /// words, or a slightly later one when the page would otherwise be short.
    fn structural_break(
        &self,
        layout: &Layout<'_>,
        start: usize,
        ideal: usize,
        limit: usize,
    ) -> Option<usize> {
        if !self.options.respect_paragraphs {
            return None;
        }
        let scan = &layout.scan;
        let min_words = self.options.minimum_words_per_page.max(1);
        let fits = |b: &&Boundary| b.offset < limit && scan.words_in(start..b.offset) >= min_words;

        let candidates = scan.boundaries_in(start..ideal);
        let keep_with_next = |b: &&Boundary| !(self.options.respect_headings && b.after_heading);
        let chosen = candidates
            .iter()
            .rev()
            .filter(fits)
            .find(keep_with_next)
            .or_else(|| candidates.iter().rev().find(fits));
        if let Some(boundary) = chosen {
            return Some(boundary.offset);
        }

        let overflow = self
            .options
            .maximum_words_per_page
            .min((layout.target as f32 * 1.5).ceil() as usize);
        scan.boundaries_in(ideal..limit)
            .iter()
            .find(keep_with_next)
            .filter(|b| scan.words_in(start..b.offset) <= overflow)
            .map(|b| b.offset)
    }

    fn forced_break(&self, layout: &Layout<'_>, start: usize, ideal: usize) -> PageDraft {
        let content = layout.content;
        let len = content.len();
        let (mut end, mut kind) =
            match self.refine(content, &layout.scan, layout.break_points, start, ideal) {
                Some(bp) => (bp.offset, BoundaryKind::Refined(bp.priority)),
                None => (ideal, BoundaryKind::Forced(0)),
            };

        let min_chars = self.options.minimum_words_per_page * 4;
        if end < len && text_len(content, start..end) < min_chars {
            end = extend_to_text_len(content, start, end, min_chars);
            kind = BoundaryKind::Forced(0);
        }

        let mut unsnapped = false;
        match snap_to_word_boundary(content, end) {
            Some(snapped) if snapped != end => {
                end = snapped;
                kind = BoundaryKind::Forced(0);
            }
            Some(_) => {}
            None => unsnapped = true,
        }

        if let Some(span) = layout.scan.protected_at(end) {
            if self.respects(span.kind) {
                let min_words = self.options.minimum_words_per_page.max(1);
                if span.range.start > start
                    && layout.scan.words_in(start..span.range.start) >= min_words
                {
                    end = span.range.start;
                    kind = BoundaryKind::Structural;
                    unsnapped = false;
                } else if layout.scan.words_in(start..span.range.end)
                    <= self.options.maximum_words_per_page
                {
                    end = span.range.end;
                    kind = BoundaryKind::Structural;
                    unsnapped = false;
                }
            }
        }

        if end <= start || end > len || layout.scan.words_in(start..end) == 0 {
            end = ideal;
            kind = BoundaryKind::Forced(0);
            unsnapped = false;
        }
        if let BoundaryKind::Forced(_) = kind {
            kind = BoundaryKind::Forced(context_score(content, end).round().clamp(1.0, 10.0) as u8);
        }
        PageDraft {
            start,
            end,
            kind,
            unsnapped,
        }
    }

    fn respects(&self, kind: ProtectedKind) -> bool {
        match kind {
            ProtectedKind::Table => self.options.respect_tables,
            ProtectedKind::Code => self.options.respect_code_blocks,
            ProtectedKind::Quote => self.options.respect_quotes,
            ProtectedKind::Figure => self.options.respect_images,
        }
    }

    fn quality(&self, layout: &Layout<'_>, draft: &PageDraft) -> u8 {
        let base = match draft.kind {
            BoundaryKind::End => return 10,
            BoundaryKind::Structural => 8,
            BoundaryKind::Refined(priority) => priority,
            BoundaryKind::Forced(context) => context,
        };
        let mut quality = base.clamp(1, 10);
        let words = layout.words(draft) as f32;
        let target = layout.target as f32;
        if words > target * 1.5 || words < target * 0.6 {
            quality = quality.saturating_sub(2).max(1);
        }
        if ends_on_terminal_punctuation(layout.content, draft.end) {
            quality = (quality + 1).min(10);
        }
        quality
    }

    fn evaluate(&self, layout: &Layout<'_>, drafts: Vec<PageDraft>) -> Evaluation {
        let qualities: Vec<u8> = drafts.iter().map(|d| self.quality(layout, d)).collect();
        let issues = self.detect_issues(layout, &drafts, &qualities);
        let average = if qualities.is_empty() {
            0.0
        } else {
            qualities.iter().map(|&q| q as f32).sum::<f32>() / qualities.len() as f32
        };
        Evaluation {
            drafts,
            qualities,
            issues,
            average,
        }
    }

    fn needs_work(&self, evaluation: &Evaluation) -> bool {
        evaluation.has_high_severity() || evaluation.average < self.optimization.quality_threshold
    }

    fn detect_issues(
        &self,
        layout: &Layout<'_>,
        drafts: &[PageDraft],
        qualities: &[u8],
    ) -> Vec<PageBreakIssue> {
        let mut issues = Vec::new();
        let target = layout.target as f32;
        let count = drafts.len();

        for (idx, (draft, &quality)) in drafts.iter().zip(qualities).enumerate() {
            let page_number = idx;
            let is_last = idx + 1 == count;
            let words = layout.words(draft);
            let ratio = words as f32 / target;
            let mut push = |kind, severity, description: String| {
                issues.push(PageBreakIssue {
                    kind,
                    page_number,
                    offset: draft.end,
                    severity,
                    description,
                });
            };

            if ratio > 2.0 || (!is_last && ratio < 0.3) {
                let severity = if ratio > 3.0 || ratio < 0.2 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                push(
                    IssueKind::UnevenPages,
                    severity,
                    format!(
                        "page {} has {} words against a target of {}",
                        page_number, words, layout.target
                    ),
                );
            }

            if quality <= 3 {
                let severity = if quality <= 2 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                push(
                    IssueKind::PoorBreak,
                    severity,
                    format!("page {} ends on a weak break (quality {})", page_number, quality),
                );
            }

            if draft.unsnapped {
                push(
                    IssueKind::PoorBreak,
                    Severity::Medium,
                    format!("page {} ends mid-word with no nearby space", page_number),
                );
            }

            if draft.is_chosen_break() {
                if let Some(span) = layout.scan.protected_at(draft.end) {
                    if self.respects(span.kind) {
                        push(
                            IssueKind::SplitElement,
                            Severity::Medium,
                            format!("page {} splits a {:?} element", page_number, span.kind)
                                .to_lowercase(),
                        );
                    }
                }
                let page = &layout.content[draft.range()];
                let has_inner_boundary = !layout
                    .scan
                    .boundaries_in(draft.start..draft.end.saturating_sub(1))
                    .is_empty();
                if !page.contains('\n')
                    && !has_inner_boundary
                    && text_len(layout.content, draft.range()) > 100
                {
                    push(
                        IssueKind::Orphan,
                        Severity::Low,
                        format!("page {} is a single unbroken line", page_number),
                    );
                }
            }

            if is_last && count > 1 && ratio < 0.1 {
                push(
                    IssueKind::Widow,
                    Severity::Medium,
                    format!("final page holds only {} words", words),
                );
            }
        }
        issues
    }

    /// One pass of targeted fixes over the current best pages.
    fn improve(&self, layout: &Layout<'_>, evaluation: &Evaluation) -> Vec<PageDraft> {
        let mut drafts = evaluation.drafts.clone();
        let min_words = self.options.minimum_words_per_page;
        let max_words = self.options.maximum_words_per_page;
        let target = layout.target as f32;

        // Fold a short trailing page into its predecessor
        if drafts.len() > 1 {
            let last = &drafts[drafts.len() - 1];
            let prev = &drafts[drafts.len() - 2];
            let last_words = layout.words(last);
            if last_words < min_words && last_words + layout.words(prev) <= max_words {
                let end = last.end;
                drafts.pop();
                if let Some(prev) = drafts.last_mut() {
                    prev.end = end;
                    prev.kind = BoundaryKind::End;
                    prev.unsnapped = false;
                }
                log::trace!("merged short trailing page");
            }
        }

        let mut idx = 0;
        while idx + 1 < drafts.len() {
            let page = &drafts[idx];
            let words = layout.words(page) as f32;
            let quality = self.quality(layout, page);
            let replacement = if words > target * 1.5 || words > max_words as f32 {
                self.split_page(layout, page, &drafts[idx + 1])
            } else if words < target * 0.6 {
                self.rebalance_pair(layout, page, &drafts[idx + 1])
            } else if quality <= 3 || page.unsnapped {
                self.resnap_pair(layout, page, &drafts[idx + 1])
            } else {
                None
            };

            if let Some(replacement) = replacement {
                let is_tail = idx + 2 == drafts.len();
                let before = self.local_quality(layout, &drafts[idx..idx + 2]);
                let after = self.local_quality(layout, &replacement);
                if after >= before && self.keeps_minimum(layout, &replacement, is_tail) {
                    log::trace!(
                        "reworked page {}: local quality {:.2} -> {:.2}",
                        idx,
                        before,
                        after
                    );
                    drafts.splice(idx..idx + 2, replacement);
                }
            }
            idx += 1;
        }
        drafts
    }

    fn local_quality(&self, layout: &Layout<'_>, drafts: &[PageDraft]) -> f32 {
        if drafts.is_empty() {
            return 0.0;
        }
        drafts
            .iter()
            .map(|d| self.quality(layout, d) as f32)
            .sum::<f32>()
            / drafts.len() as f32
    }

    /// Every page but a chapter-final one keeps the minimum word count.
    fn keeps_minimum(&self, layout: &Layout<'_>, drafts: &[PageDraft], ends_chapter: bool) -> bool {
        let min_words = self.options.minimum_words_per_page;
        drafts.iter().enumerate().all(|(i, d)| {
            (ends_chapter && i + 1 == drafts.len()) || layout.words(d) >= min_words
        })
    }

    fn split_page(
        &self,
        layout: &Layout<'_>,
        page: &PageDraft,
        next: &PageDraft,
    ) -> Option<Vec<PageDraft>> {
        let half = layout.words(page) / 2;
        let ideal = layout.scan.offset_after_words(page.start, half.max(1));
        let first = match self.structural_break(layout, page.start, ideal, page.end) {
            Some(end) => PageDraft::new(page.start, end, BoundaryKind::Structural),
            None => self.forced_break(layout, page.start, ideal),
        };
        if first.end >= page.end {
            return None;
        }
        let second = PageDraft {
            start: first.end,
            ..page.clone()
        };
        Some(vec![first, second, next.clone()])
    }

    fn rebalance_pair(
        &self,
        layout: &Layout<'_>,
        page: &PageDraft,
        next: &PageDraft,
    ) -> Option<Vec<PageDraft>> {
        let combined = PageDraft {
            start: page.start,
            ..next.clone()
        };
        let total = layout.words(&combined);
        if total <= self.options.maximum_words_per_page {
            return Some(vec![combined]);
        }
        let share = (total / 2).max(self.options.minimum_words_per_page).max(1);
        let ideal = layout.scan.offset_after_words(page.start, share);
        let first = match self.structural_break(layout, page.start, ideal, next.end) {
            Some(end) => PageDraft::new(page.start, end, BoundaryKind::Structural),
            None => self.forced_break(layout, page.start, ideal),
        };
        if first.end >= next.end {
            return None;
        }
        Some(vec![
            first.clone(),
            PageDraft {
                start: first.end,
                ..next.clone()
            },
        ])
    }

    fn resnap_pair(
        &self,
        layout: &Layout<'_>,
        page: &PageDraft,
        next: &PageDraft,
    ) -> Option<Vec<PageDraft>> {
        let min_words = self.options.minimum_words_per_page.max(1);
        let boundary = layout
            .scan
            .boundaries_in(page.start..next.end)
            .iter()
            .filter(|b| {
                b.offset < next.end
                    && layout.scan.words_in(page.start..b.offset) >= min_words
                    && layout.scan.words_in(b.offset..next.end) > 0
            })
            .min_by_key(|b| b.offset.abs_diff(page.end))?;
        Some(vec![
            PageDraft::new(page.start, boundary.offset, BoundaryKind::Structural),
            PageDraft {
                start: boundary.offset,
                ..next.clone()
            },
        ])
    }

    fn assemble(
        &self,
        layout: &Layout<'_>,
        evaluation: Evaluation,
        chapter_index: usize,
        global_page_offset: usize,
        iterations: u8,
    ) -> PageBreakResult {
        let pages: Vec<PageInfo> = evaluation
            .drafts
            .iter()
            .zip(&evaluation.qualities)
            .enumerate()
            .map(|(idx, (draft, &quality))| {
                let page_number = idx;
                let word_count = layout.words(draft);
                PageInfo {
                    id: format!("page-{}-{}", chapter_index, page_number),
                    page_number,
                    global_page_number: global_page_offset + page_number,
                    start_offset: draft.start,
                    end_offset: draft.end,
                    word_count,
                    estimated_read_time: reading_time_minutes(word_count),
                    has_images: layout.scan.has_image_in(draft.range()),
                    has_tables: layout.scan.has_table_in(draft.range()),
                    content_density: page_density(word_count),
                    break_quality: quality,
                }
            })
            .collect();

        let total_quality_score: f32 = evaluation.qualities.iter().map(|&q| q as f32).sum();
        let optimization_suggestions = suggestions(&pages, &evaluation);
        PageBreakResult {
            pages,
            total_quality_score,
            average_quality_score: evaluation.average,
            problematic_breaks: evaluation.issues,
            optimization_suggestions,
            iterations,
        }
    }
}

fn page_density(words: usize) -> Density {
    if words < 200 {
        Density::Low
    } else if words > 400 {
        Density::High
    } else {
        Density::Medium
    }
}

fn suggestions(pages: &[PageInfo], evaluation: &Evaluation) -> Vec<String> {
    let count = pages.len();
    if count == 0 {
        return Vec::new();
    }
    let of_kind = |kind: IssueKind| {
        evaluation
            .issues
            .iter()
            .filter(|issue| issue.kind == kind)
            .count()
    };

    let mut out = Vec::new();
    if of_kind(IssueKind::UnevenPages) * 5 > count {
        out.push(
            "Over 20% of pages are far from the target length; widen the allowed words-per-page range"
                .to_string(),
        );
    }
    if of_kind(IssueKind::PoorBreak) * 10 > count {
        out.push(
            "Over 10% of pages end on weak breaks; allow sentence breaks or lower the minimum words per page"
                .to_string(),
        );
    }
    if count > 1 {
        let mean = pages.iter().map(|p| p.word_count as f32).sum::<f32>() / count as f32;
        let variance = pages
            .iter()
            .map(|p| (p.word_count as f32 - mean).powi(2))
            .sum::<f32>()
            / count as f32;
        if mean > 0.0 && variance.sqrt() > mean * 0.4 {
            out.push(
                "Page lengths vary by more than 40% of the mean; consider relaxing structural constraints"
                    .to_string(),
            );
        }
    }
    if evaluation.average < 6.0 {
        out.push(
            "Average break quality is below 6; enable advanced optimization or adjust page size limits"
                .to_string(),
        );
    }
    out
}

/// Text characters before `offset`, nearest first, with tags skipped
fn text_before(content: &str, offset: usize) -> impl Iterator<Item = char> + '_ {
    let mut in_tag = false;
    content[..offset].chars().rev().filter(move |&ch| match ch {
        '>' => {
            in_tag = true;
            false
        }
        '<' if in_tag => {
            in_tag = false;
            false
        }
        _ => !in_tag,
    })
}

/// Text characters in `content[offset..]`, with tags skipped
fn text_after(content: &str, offset: usize) -> impl Iterator<Item = char> + '_ {
    let mut in_tag = false;
    content[offset..].chars().filter(move |&ch| match ch {
        '<' => {
            in_tag = true;
            false
        }
        '>' if in_tag => {
            in_tag = false;
            false
        }
        _ => !in_tag,
    })
}

fn text_len(content: &str, range: Range<usize>) -> usize {
    text_after(&content[..range.end], range.start).count()
}

fn inside_tag(content: &str, offset: usize) -> bool {
    let before = &content[..offset];
    match (before.rfind('<'), before.rfind('>')) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

fn is_mid_word(content: &str, offset: usize) -> bool {
    let prev = content[..offset].chars().next_back();
    let next = content[offset..].chars().next();
    matches!((prev, next), (Some(a), Some(b)) if a.is_alphanumeric() && b.is_alphanumeric())
}

fn ends_on_terminal_punctuation(content: &str, offset: usize) -> bool {
    let mut tail: Vec<char> = text_before(content, offset).take(16).collect();
    tail.reverse();
    let tail: String = tail.into_iter().collect();
    matches!(
        last_significant_char(&tail),
        Some('.' | '!' | '?' | '\u{2026}')
    )
}

/// Whether `offset` sits inside an unclosed quotation in its paragraph
fn inside_open_quote(content: &str, offset: usize) -> bool {
    let floor = floor_char_boundary(content, offset.saturating_sub(2000));
    let paragraph_start = content[floor..offset]
        .rfind("<p")
        .map(|p| floor + p)
        .unwrap_or(floor);
    let (mut straight, mut open, mut close) = (0usize, 0usize, 0usize);
    for ch in text_after(&content[..offset], paragraph_start) {
        match ch {
            '"' => straight += 1,
            '\u{201c}' => open += 1,
            '\u{201d}' => close += 1,
            _ => {}
        }
    }
    straight % 2 == 1 || open > close
}

/// Local text quality of a break at `offset`, 0-10.
fn context_score(content: &str, offset: usize) -> f32 {
    let mut score: f32 = 5.0;
    if ends_on_terminal_punctuation(content, offset) {
        score += 3.0;
    }
    if text_after(content, offset)
        .find(|c| !c.is_whitespace())
        .is_some_and(char::is_uppercase)
    {
        score += 2.0;
    }
    if is_mid_word(content, offset) {
        score -= 4.0;
    }
    if inside_open_quote(content, offset) {
        score -= 3.0;
    }
    score.clamp(0.0, 10.0)
}

/// Move a mid-word `offset` to just past the nearest whitespace or tag
/// within [`SNAP_RADIUS`] bytes, searching forward first.
fn snap_to_word_boundary(content: &str, offset: usize) -> Option<usize> {
    if !is_mid_word(content, offset) {
        return Some(offset);
    }
    for (i, ch) in content[offset..].char_indices() {
        if i > SNAP_RADIUS {
            break;
        }
        if ch == '<' {
            return Some(offset + i);
        }
        if ch.is_whitespace() {
            return Some(offset + i + ch.len_utf8());
        }
    }
    for (i, ch) in content[..offset].char_indices().rev() {
        if offset - i > SNAP_RADIUS {
            break;
        }
        if ch == '>' || ch.is_whitespace() {
            return Some(i + ch.len_utf8());
        }
    }
    None
}

/// Grow a page until it holds `min_chars` text characters, then continue
/// to the next whitespace.
fn extend_to_text_len(content: &str, start: usize, end: usize, min_chars: usize) -> usize {
    let mut have = text_len(content, start..end);
    let mut in_tag = false;
    let mut reached = false;
    for (i, ch) in content[end..].char_indices() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ if reached && ch.is_whitespace() => return end + i + ch.len_utf8(),
            _ => {
                have += 1;
                if have >= min_chars {
                    reached = true;
                }
            }
        }
    }
    content.len()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
