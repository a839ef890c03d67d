//! Reading-velocity, cognitive-load and content-pattern estimates
//!
//! Complements the structural analyzer with heuristics about *how* text
//! reads: how fast, how demanding, and whether a stretch is dialogue,
//! narrative, description or technical exposition. The regex families here
//! are approximate; paragraph classification goes through the
//! [`SegmentClassifier`] trait so a stronger model can replace it.

use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{walk_markup, MarkupDocument};
use crate::model::ContentAnalysis;
use crate::readability::{count_words, split_sentences, TextStatistics, BASELINE_WPM};
use crate::settings::PageCalculationSettings;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).expect("static regex"));
    };
}

static_regex!(ACRONYM, r"\b[A-Z]{2,}\b");
static_regex!(DECIMAL, r"\b\d+\.\d+\b");
static_regex!(FUNCTION_CALL, r"\b[A-Za-z_][A-Za-z0-9_]*\([^)]*\)");
static_regex!(
    CAMEL_CASE,
    r"\b(?:[a-z]+(?:[A-Z][a-z0-9]+)+|[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+)\b"
);
static_regex!(
    TECHNICAL_VOCABULARY,
    r"(?i)\b(?:algorithm|function|variable|database|server|protocol|parameter|interface|compiler|runtime|bandwidth|latency)s?\b"
);
static_regex!(QUOTED, "\"[^\"]+\"|\u{201c}[^\u{201d}]+\u{201d}");
static_regex!(
    SPEECH_VERB,
    r"(?i)\b(?:said|says|asked|replied|whispered|shouted|exclaimed|answered|muttered|cried|called)\b"
);
static_regex!(
    TRANSITION,
    r"(?i)\b(?:then|next|afterwards|later|meanwhile|finally|suddenly|eventually|however|therefore|moreover|furthermore|consequently)\b"
);
static_regex!(
    TEMPORAL,
    r"(?i)\b(?:then|later|after|before|when|suddenly|finally|meanwhile|next|once|soon)\b"
);
static_regex!(PAST_TENSE, r"\b[A-Za-z]{3,}ed\b");
static_regex!(
    DESCRIPTIVE,
    r"(?i)\b(?:[a-z]+(?:ous|ful|ive|able|ible|less|ish)|bright|dark|soft|cold|warm|sweet|bitter|loud|quiet|smooth|rough|golden|silver|pale|crimson|scent|glow|shimmer|gleam|fragrant|velvet)\b"
);
static_regex!(
    EMOTIONAL,
    r"(?i)\b(?:fear|terror|love|hate|rage|anger|joy|grief|scream|blood|death|desperate|panic|tears|heart)[a-z]*\b"
);
static_regex!(
    COMPLEX_CONJUNCTION,
    r"(?i)\b(?:although|whereas|nevertheless|notwithstanding|whereby|insofar|albeit|furthermore|moreover|consequently)\b"
);
static_regex!(
    PASSIVE_VOICE,
    r"(?i)\b(?:am|is|are|was|were|be|been|being)\s+(?:[a-z]+ly\s+)?[a-z]+(?:ed|en)\b"
);

/// Overall difficulty class
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Complexity {
    /// Light reading
    #[default]
    Low,
    /// Typical prose
    Medium,
    /// Demanding content
    High,
}

/// Density, pace and load estimates for one chapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentDensityMetrics {
    /// Total words
    pub word_count: usize,
    /// Total sentences
    pub sentence_count: usize,
    /// Text blocks
    pub paragraph_count: usize,
    /// Mean words per sentence
    pub average_words_per_sentence: f32,
    /// Mean words per paragraph
    pub average_words_per_paragraph: f32,
    /// `<img>` elements
    pub image_count: usize,
    /// `<table>` elements
    pub table_count: usize,
    /// `<ul>`/`<ol>` elements
    pub list_count: usize,
    /// `<pre>` elements
    pub code_block_count: usize,
    /// `<blockquote>` elements
    pub quote_count: usize,
    /// Sum of all visual elements above
    pub visual_element_count: usize,
    /// Difficulty class
    pub complexity: Complexity,
    /// Technical pattern matches per word, 0-1
    pub technical_content_ratio: f32,
    /// Dialogue words per word, 0-1
    pub dialogue_ratio: f32,
    /// Transition words per sentence, scaled 0-10
    pub narrative_flow: f32,
    /// Estimated words per minute, 150-350
    pub reading_velocity: f32,
    /// Estimated demand on the reader, 0-10
    pub cognitive_load: f32,
}

/// Reader proficiency
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadingLevel {
    /// Slower, careful reading
    Beginner,
    /// Typical adult reader
    #[default]
    Intermediate,
    /// Practiced, fast reader
    Advanced,
}

/// Broad genre of the book
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Genre {
    /// Novels and stories
    Fiction,
    /// General non-fiction
    #[default]
    NonFiction,
    /// Manuals, programming books
    Technical,
    /// Papers and textbooks
    Academic,
    /// Verse
    Poetry,
}

/// Who is reading, what, and on which device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadingContext {
    /// Reader proficiency
    pub level: ReadingLevel,
    /// Genre of the book
    pub genre: Genre,
    /// Phone-sized screen
    pub small_screen: bool,
    /// Touch input
    pub touch_device: bool,
}

/// Optional structural input for [`ContentDensityAnalyzer::calculate_cognitive_load`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentStructure {
    /// Level of every heading, in document order
    pub heading_levels: Vec<u8>,
    /// Images and tables
    pub visual_element_count: usize,
    /// Paragraph-type elements
    pub paragraph_count: usize,
}

impl DocumentStructure {
    /// Derive structure from a structural analysis
    pub fn from_analysis(analysis: &ContentAnalysis) -> Self {
        Self {
            heading_levels: analysis
                .semantic_elements
                .iter()
                .filter_map(|el| el.level)
                .collect(),
            visual_element_count: analysis.content_metrics.image_count
                + analysis.content_metrics.table_count,
            paragraph_count: analysis.content_metrics.paragraph_count,
        }
    }

    fn heading_depth_variance(&self) -> f32 {
        if self.heading_levels.is_empty() {
            return 0.0;
        }
        let n = self.heading_levels.len() as f32;
        let mean = self.heading_levels.iter().map(|&l| l as f32).sum::<f32>() / n;
        self.heading_levels
            .iter()
            .map(|&l| (l as f32 - mean).powi(2))
            .sum::<f32>()
            / n
    }
}

/// Why a reading pause is recommended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseReason {
    /// Cognitive load above 7
    HighCognitiveLoad,
    /// High complexity class
    HighComplexity,
    /// Technical ratio above 0.25
    TechnicalContent,
}

/// A suggested rest point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PauseRecommendation {
    /// Trigger
    pub reason: PauseReason,
    /// Suggested interval between pauses, in words
    pub every_words: usize,
    /// Suggested pause length
    pub duration_seconds: u32,
}

/// Presentation recommendations derived from density.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadingFlowOptimizations {
    /// Font size in pixels
    pub recommended_font_size: f32,
    /// Line height multiple, at most 2.0
    pub recommended_line_height: f32,
    /// Target words per page
    pub recommended_words_per_page: usize,
    /// Words per minute
    pub recommended_reading_speed: f32,
    /// Multiplier on how often pages should break (>1 means shorter pages)
    pub break_frequency: f32,
    /// Whether distraction-free reading is advised
    pub focus_mode_recommended: bool,
    /// Suggested pauses, at most one per reason
    pub pause_recommendations: heapless::Vec<PauseRecommendation, 3>,
}

/// Classified character of a paragraph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Quoted speech
    Dialogue,
    /// Events in sequence
    Narrative,
    /// Sensory or adjective-heavy description
    Descriptive,
    /// Exposition with technical terms
    Technical,
    /// None of the above dominates
    Mixed,
}

impl SegmentKind {
    fn index(self) -> usize {
        match self {
            SegmentKind::Dialogue => 0,
            SegmentKind::Narrative => 1,
            SegmentKind::Descriptive => 2,
            SegmentKind::Technical => 3,
            SegmentKind::Mixed => 4,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Dialogue => "dialogue",
            SegmentKind::Narrative => "narrative",
            SegmentKind::Descriptive => "descriptive",
            SegmentKind::Technical => "technical",
            SegmentKind::Mixed => "mixed",
        }
    }
}

/// How jarring a switch between two segment kinds is, 0-1.
const TRANSITION_ABRUPTNESS: [[f32; 5]; 5] = [
    // dialogue, narrative, descriptive, technical, mixed
    [0.0, 0.3, 0.5, 0.9, 0.4],
    [0.3, 0.0, 0.2, 0.8, 0.3],
    [0.5, 0.2, 0.0, 0.7, 0.3],
    [0.9, 0.8, 0.7, 0.0, 0.5],
    [0.4, 0.3, 0.3, 0.5, 0.0],
];

/// One classified paragraph.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentSegment {
    /// Index among the chapter's text blocks
    pub paragraph_index: usize,
    /// Classification
    pub kind: SegmentKind,
    /// Words in the paragraph
    pub word_count: usize,
}

/// A change of segment kind between adjacent paragraphs.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionPoint {
    /// Index of the paragraph that starts the new kind
    pub paragraph_index: usize,
    /// Kind before
    pub from: SegmentKind,
    /// Kind after
    pub to: SegmentKind,
    /// 0-1, from the fixed type-pair matrix
    pub abruptness: f32,
}

/// Paragraph-level pattern map of a chapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentPatterns {
    /// One entry per paragraph
    pub segments: Vec<ContentSegment>,
    /// Kind changes between adjacent paragraphs
    pub transitions: Vec<TransitionPoint>,
    /// Per-paragraph intensity, 1-10
    pub intensity_map: Vec<u8>,
}

/// Source of a reading difficulty
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorKind {
    /// Word choice
    Vocabulary,
    /// Sentence construction
    Syntax,
    /// Subject matter
    Concept,
}

/// A threshold crossing that makes text harder to read.
#[derive(Clone, Debug, PartialEq)]
pub struct DifficultyFactor {
    /// Category
    pub kind: FactorKind,
    /// Human-readable description
    pub description: &'static str,
    /// Observed value that crossed the threshold
    pub value: f32,
}

/// Classic readability indices plus qualitative difficulty factors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadabilityAssessment {
    /// Flesch Reading Ease (higher is easier)
    pub flesch_reading_ease: f32,
    /// Flesch-Kincaid grade level
    pub flesch_kincaid_grade: f32,
    /// Passive constructions per sentence, 0-1
    pub passive_voice_ratio: f32,
    /// Minutes at 250 WPM, rounded up
    pub reading_time_minutes: u32,
    /// Triggered difficulty factors
    pub difficulty_factors: heapless::Vec<DifficultyFactor, 5>,
}

/// Paragraph classification strategy.
pub trait SegmentClassifier {
    /// Classify one paragraph of plain text
    fn classify(&self, paragraph: &str) -> SegmentKind;
}

/// Regex-family classifier: quotes and speech verbs, technical terms,
/// adjective and sensory words, temporal transitions and past tense.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicClassifier;

impl SegmentClassifier for HeuristicClassifier {
    fn classify(&self, paragraph: &str) -> SegmentKind {
        let words = count_words(paragraph);
        if words == 0 {
            return SegmentKind::Mixed;
        }
        let per_word = |n: usize| n as f32 / words as f32;
        if QUOTED.is_match(paragraph) || SPEECH_VERB.is_match(paragraph) {
            SegmentKind::Dialogue
        } else if per_word(technical_matches(paragraph)) > 0.1 {
            SegmentKind::Technical
        } else if per_word(DESCRIPTIVE.find_iter(paragraph).count()) > 0.15 {
            SegmentKind::Descriptive
        } else if TEMPORAL.is_match(paragraph) || per_word(PAST_TENSE.find_iter(paragraph).count()) > 0.08 {
            SegmentKind::Narrative
        } else {
            SegmentKind::Mixed
        }
    }
}

/// Density, velocity, load and pattern estimation.
#[derive(Clone, Debug, Default)]
pub struct ContentDensityAnalyzer<C = HeuristicClassifier> {
    classifier: C,
}

impl ContentDensityAnalyzer {
    /// Analyzer with the regex-based classifier
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: SegmentClassifier> ContentDensityAnalyzer<C> {
    /// Analyzer with a custom paragraph classifier
    pub fn with_classifier(classifier: C) -> Self {
        Self { classifier }
    }

    /// Count words, visuals and patterns, and estimate velocity and load.
    pub fn calculate_content_density(&self, html: &str) -> ContentDensityMetrics {
        let doc = walk_markup(html);
        let stats = TextStatistics::from_text(&doc.text);
        if stats.words == 0 {
            return ContentDensityMetrics {
                reading_velocity: BASELINE_WPM,
                ..ContentDensityMetrics::default()
            };
        }

        let paragraph_count = doc.leaf_blocks().len().max(1);
        let mut metrics = ContentDensityMetrics {
            word_count: stats.words,
            sentence_count: stats.sentences,
            paragraph_count,
            average_words_per_sentence: stats.avg_words_per_sentence(),
            average_words_per_paragraph: stats.words as f32 / paragraph_count as f32,
            image_count: doc.count_tag("img"),
            table_count: doc.count_tag("table"),
            list_count: doc.count_tag("ul") + doc.count_tag("ol"),
            code_block_count: doc.count_tag("pre"),
            quote_count: doc.count_tag("blockquote"),
            technical_content_ratio: technical_ratio(&doc.text, stats.words),
            dialogue_ratio: dialogue_ratio(&doc.text, stats.words),
            narrative_flow: (TRANSITION.find_iter(&doc.text).count() as f32
                / stats.sentences as f32
                * 10.0)
                .clamp(0.0, 10.0),
            ..ContentDensityMetrics::default()
        };
        metrics.visual_element_count = metrics.image_count
            + metrics.table_count
            + metrics.list_count
            + metrics.code_block_count
            + metrics.quote_count;
        metrics.complexity = classify_complexity(&metrics);
        metrics.reading_velocity = base_reading_velocity(&metrics);
        metrics.cognitive_load = density_cognitive_load(&metrics);
        metrics
    }

    /// Adjust the base velocity for reader, genre, device and load.
    pub fn analyze_reading_velocity(
        &self,
        density: &ContentDensityMetrics,
        context: &ReadingContext,
    ) -> f32 {
        let mut velocity = density.reading_velocity;
        velocity *= match context.level {
            ReadingLevel::Beginner => 0.7,
            ReadingLevel::Intermediate => 1.0,
            ReadingLevel::Advanced => 1.2,
        };
        velocity *= match context.genre {
            Genre::Fiction => 1.1,
            Genre::NonFiction => 1.0,
            Genre::Technical => 0.6,
            Genre::Academic => 0.7,
            Genre::Poetry => 0.5,
        };
        if context.small_screen {
            velocity *= 0.9;
        }
        if context.touch_device {
            velocity *= 0.95;
        }
        velocity *= (1.0 - density.cognitive_load / 20.0).max(0.5);
        velocity.clamp(100.0, 400.0)
    }

    /// Estimate reading demand 0-10 from text and optional structure.
    pub fn calculate_cognitive_load(&self, html: &str, structure: Option<&DocumentStructure>) -> f32 {
        let doc = walk_markup(html);
        let stats = TextStatistics::from_text(&doc.text);
        if stats.words == 0 {
            return 0.0;
        }

        let mut load = (stats.avg_words_per_sentence() / 25.0 * 3.0).min(3.0);
        load += stats.long_word_ratio() * 10.0;
        load += technical_ratio(&doc.text, stats.words) * 15.0;
        if let Some(structure) = structure {
            let visual_ratio =
                structure.visual_element_count as f32 / structure.paragraph_count.max(1) as f32;
            load += visual_ratio.min(1.0) * 2.0;
            load += structure.heading_depth_variance().min(2.0) * 0.5;
        }
        let conjunctions =
            COMPLEX_CONJUNCTION.find_iter(&doc.text).count() + doc.text.matches(';').count();
        load += (conjunctions as f32 / stats.sentences as f32 * 10.0).min(3.0);
        load.clamp(0.0, 10.0)
    }

    /// Recommend typography, page size and pacing for this density.
    pub fn optimize_for_reading_flow(
        &self,
        density: &ContentDensityMetrics,
        settings: &PageCalculationSettings,
    ) -> ReadingFlowOptimizations {
        let recommended_font_size = settings.font_size
            * match density.complexity {
                Complexity::High => 1.1,
                Complexity::Medium => 1.0,
                Complexity::Low => 0.95,
            };
        let recommended_line_height = if density.average_words_per_sentence > 20.0 {
            (settings.line_height * 1.15).min(2.0)
        } else {
            settings.line_height
        };
        let recommended_words_per_page = if density.complexity == Complexity::High {
            200
        } else if density.technical_content_ratio > 0.25 {
            250
        } else if density.dialogue_ratio > 0.3 {
            350
        } else {
            300
        };
        let break_frequency = if density.cognitive_load > 7.0 {
            1.3
        } else if density.cognitive_load < 4.0 {
            0.8
        } else {
            1.0
        };
        let focus_mode_recommended = density.complexity == Complexity::High
            || density.cognitive_load > 6.0
            || density.technical_content_ratio > 0.25;

        let mut pause_recommendations = heapless::Vec::new();
        let candidates = [
            (
                density.cognitive_load > 7.0,
                PauseRecommendation {
                    reason: PauseReason::HighCognitiveLoad,
                    every_words: 500,
                    duration_seconds: 30,
                },
            ),
            (
                density.complexity == Complexity::High,
                PauseRecommendation {
                    reason: PauseReason::HighComplexity,
                    every_words: 750,
                    duration_seconds: 20,
                },
            ),
            (
                density.technical_content_ratio > 0.25,
                PauseRecommendation {
                    reason: PauseReason::TechnicalContent,
                    every_words: 400,
                    duration_seconds: 45,
                },
            ),
        ];
        for (triggered, pause) in candidates {
            if triggered {
                // Capacity equals the number of candidates
                let _ = pause_recommendations.push(pause);
            }
        }

        ReadingFlowOptimizations {
            recommended_font_size,
            recommended_line_height,
            recommended_words_per_page,
            recommended_reading_speed: self
                .analyze_reading_velocity(density, &ReadingContext::default()),
            break_frequency,
            focus_mode_recommended,
            pause_recommendations,
        }
    }

    /// Classify paragraphs, locate kind transitions and map intensity.
    pub fn detect_content_patterns(&self, html: &str) -> ContentPatterns {
        let doc = walk_markup(html);
        self.patterns_for(&doc)
    }

    fn patterns_for(&self, doc: &MarkupDocument) -> ContentPatterns {
        let mut patterns = ContentPatterns::default();
        let paragraphs = doc.leaf_blocks().into_iter().filter(|p| count_words(p) > 0);
        for (paragraph_index, paragraph) in paragraphs.enumerate() {
            let kind = self.classifier.classify(paragraph);
            if let Some(prev) = patterns.segments.last() {
                if prev.kind != kind {
                    patterns.transitions.push(TransitionPoint {
                        paragraph_index,
                        from: prev.kind,
                        to: kind,
                        abruptness: TRANSITION_ABRUPTNESS[prev.kind.index()][kind.index()],
                    });
                }
            }
            patterns.intensity_map.push(paragraph_intensity(paragraph, kind));
            patterns.segments.push(ContentSegment {
                paragraph_index,
                kind,
                word_count: count_words(paragraph),
            });
        }
        patterns
    }

    /// Flesch indices, passive voice and difficulty factors.
    pub fn assess_readability_factors(&self, html: &str) -> ReadabilityAssessment {
        let doc = walk_markup(html);
        let stats = TextStatistics::from_text(&doc.text);
        if stats.words == 0 {
            return ReadabilityAssessment::default();
        }

        let passive_voice_ratio = (PASSIVE_VOICE.find_iter(&doc.text).count() as f32
            / stats.sentences as f32)
            .clamp(0.0, 1.0);
        let tech = technical_ratio(&doc.text, stats.words);

        let checks = [
            (
                stats.avg_word_length() > 6.0,
                FactorKind::Vocabulary,
                "long average word length",
                stats.avg_word_length(),
            ),
            (
                stats.avg_syllables_per_word() > 1.7,
                FactorKind::Vocabulary,
                "many polysyllabic words",
                stats.avg_syllables_per_word(),
            ),
            (
                stats.avg_words_per_sentence() > 25.0,
                FactorKind::Syntax,
                "long sentences",
                stats.avg_words_per_sentence(),
            ),
            (
                passive_voice_ratio > 0.2,
                FactorKind::Syntax,
                "frequent passive voice",
                passive_voice_ratio,
            ),
            (
                tech > 0.1,
                FactorKind::Concept,
                "dense technical terminology",
                tech,
            ),
        ];
        let mut difficulty_factors = heapless::Vec::new();
        for (triggered, kind, description, value) in checks {
            if triggered {
                let _ = difficulty_factors.push(DifficultyFactor {
                    kind,
                    description,
                    value,
                });
            }
        }

        ReadabilityAssessment {
            flesch_reading_ease: stats.flesch_reading_ease(),
            flesch_kincaid_grade: stats.flesch_kincaid_grade(),
            passive_voice_ratio,
            reading_time_minutes: crate::readability::reading_time_minutes(stats.words),
            difficulty_factors,
        }
    }
}

/// Density metrics with the default classifier.
pub fn calculate_content_density(html: &str) -> ContentDensityMetrics {
    ContentDensityAnalyzer::new().calculate_content_density(html)
}

fn technical_matches(text: &str) -> usize {
    [
        &*ACRONYM,
        &*DECIMAL,
        &*FUNCTION_CALL,
        &*CAMEL_CASE,
        &*TECHNICAL_VOCABULARY,
    ]
    .iter()
    .map(|re| re.find_iter(text).count())
    .sum()
}

fn technical_ratio(text: &str, words: usize) -> f32 {
    if words == 0 {
        return 0.0;
    }
    (technical_matches(text) as f32 / words as f32).min(1.0)
}

fn dialogue_ratio(text: &str, words: usize) -> f32 {
    if words == 0 {
        return 0.0;
    }
    let quoted: usize = QUOTED.find_iter(text).map(|m| count_words(m.as_str())).sum();
    let verbs = SPEECH_VERB.find_iter(text).count();
    ((quoted + verbs) as f32 / words as f32).min(1.0)
}

fn classify_complexity(metrics: &ContentDensityMetrics) -> Complexity {
    let mut score = 0;
    if metrics.average_words_per_sentence > 20.0 {
        score += 2;
    } else if metrics.average_words_per_sentence > 15.0 {
        score += 1;
    }
    if metrics.average_words_per_paragraph > 100.0 {
        score += 2;
    } else if metrics.average_words_per_paragraph > 75.0 {
        score += 1;
    }
    let tech = metrics.technical_content_ratio;
    if tech > 0.3 {
        score += 3;
    } else if tech > 0.15 {
        score += 2;
    } else if tech > 0.05 {
        score += 1;
    }
    if metrics.visual_element_count > 10 {
        score += 1;
    }
    match score {
        s if s >= 5 => Complexity::High,
        s if s >= 2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

fn base_reading_velocity(metrics: &ContentDensityMetrics) -> f32 {
    let mut velocity = BASELINE_WPM
        * match metrics.complexity {
            Complexity::High => 0.7,
            Complexity::Medium => 0.85,
            Complexity::Low => 1.1,
        };
    velocity *= 1.0 - metrics.technical_content_ratio.min(1.0) * 0.6;
    velocity *= 1.0 + metrics.dialogue_ratio.min(1.0) * 0.3;
    velocity *= 1.0 + metrics.narrative_flow / 10.0 * 0.2;
    velocity.clamp(150.0, 350.0)
}

fn density_cognitive_load(metrics: &ContentDensityMetrics) -> f32 {
    let base = match metrics.complexity {
        Complexity::High => 6.0,
        Complexity::Medium => 4.0,
        Complexity::Low => 2.0,
    };
    let sentence_load = (metrics.average_words_per_sentence / 20.0).min(2.0);
    let technical_load = metrics.technical_content_ratio * 8.0;
    let visual_load = (metrics.visual_element_count as f32 * 0.2).min(2.0);
    (base + sentence_load + technical_load + visual_load).clamp(0.0, 10.0)
}

fn paragraph_intensity(paragraph: &str, kind: SegmentKind) -> u8 {
    let sentences = split_sentences(paragraph);
    let words = count_words(paragraph);
    let avg_sentence = if sentences.is_empty() {
        0.0
    } else {
        words as f32 / sentences.len() as f32
    };
    let mut intensity = 3.0 + (avg_sentence / 10.0).min(3.0);
    intensity += (technical_ratio(paragraph, words) * 10.0).min(2.0);
    intensity += (EMOTIONAL.find_iter(paragraph).count() as f32).min(2.0);
    if kind == SegmentKind::Dialogue {
        intensity -= 1.0;
    }
    intensity.round().clamp(1.0, 10.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const NARRATIVE: &str = "<p>The ship left the harbor at dawn. Later the wind turned \
        and the crew worked the sails. Finally they reached the open sea.</p>";

    const TECHNICAL: &str = "<p>The HTTP server parses JSON via parseRequest() and \
        stores 3.14 values in the SQL database. Each API call returns XML.</p>";

    const DIALOGUE: &str = "<p>\"Where are you going?\" she asked.</p>\
        <p>\"Out,\" he replied. \"Back soon.\"</p>";

    #[test]
    fn test_empty_content_zero_metrics() {
        let analyzer = ContentDensityAnalyzer::new();
        for html in ["", "<div></div>", "   "] {
            let metrics = analyzer.calculate_content_density(html);
            assert_eq!(metrics.word_count, 0);
            assert_eq!(metrics.complexity, Complexity::Low);
            assert_eq!(metrics.cognitive_load, 0.0);
            assert!(analyzer.detect_content_patterns(html).segments.is_empty());
            assert_eq!(analyzer.assess_readability_factors(html), ReadabilityAssessment::default());
            assert_eq!(analyzer.calculate_cognitive_load(html, None), 0.0);
        }
    }

    #[test]
    fn test_visual_element_counts() {
        let html = "<p>Intro text here.</p><img src=\"a.png\"/><table><tr><td>x</td></tr></table>\
                    <ul><li>one</li></ul><ol><li>two</li></ol><pre>code</pre>\
                    <blockquote>quoted words</blockquote>";
        let metrics = calculate_content_density(html);
        assert_eq!(metrics.image_count, 1);
        assert_eq!(metrics.table_count, 1);
        assert_eq!(metrics.list_count, 2);
        assert_eq!(metrics.code_block_count, 1);
        assert_eq!(metrics.quote_count, 1);
        assert_eq!(metrics.visual_element_count, 6);
    }

    #[test]
    fn test_technical_content_detected() {
        let tech = calculate_content_density(TECHNICAL);
        let story = calculate_content_density(NARRATIVE);
        assert!(tech.technical_content_ratio > 0.3, "{}", tech.technical_content_ratio);
        assert_eq!(story.technical_content_ratio, 0.0);
        assert!(tech.reading_velocity < story.reading_velocity);
        assert!(tech.cognitive_load > story.cognitive_load);
    }

    #[test]
    fn test_dialogue_ratio() {
        let metrics = calculate_content_density(DIALOGUE);
        assert!(metrics.dialogue_ratio > 0.5, "{}", metrics.dialogue_ratio);
        assert!(calculate_content_density(NARRATIVE).dialogue_ratio == 0.0);
    }

    #[test]
    fn test_narrative_flow_scaled() {
        let metrics = calculate_content_density(NARRATIVE);
        // "Later" and "Finally" across three sentences
        assert!((metrics.narrative_flow - 20.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_complexity_thresholds() {
        let long_sentence = format!("<p>{}.</p>", "word ".repeat(120));
        let metrics = calculate_content_density(&long_sentence);
        // sentence > 20 (+2), paragraph > 100 (+2)
        assert_eq!(metrics.complexity, Complexity::Medium);
        let technical = calculate_content_density(&format!(
            "<p>{}</p>",
            "The HTTP API returns JSON from the SQL server via getRows(). ".repeat(10)
        ));
        assert_eq!(technical.complexity, Complexity::High);
        let simple = calculate_content_density("<p>The cat sat. The dog ran.</p>");
        assert_eq!(simple.complexity, Complexity::Low);
    }

    #[test]
    fn test_velocity_clamped() {
        for html in [NARRATIVE, TECHNICAL, DIALOGUE] {
            let v = calculate_content_density(html).reading_velocity;
            assert!((150.0..=350.0).contains(&v), "{}", v);
        }
    }

    #[test]
    fn test_analyze_reading_velocity_context() {
        let analyzer = ContentDensityAnalyzer::new();
        let density = analyzer.calculate_content_density(NARRATIVE);
        let base = analyzer.analyze_reading_velocity(&density, &ReadingContext::default());
        let beginner = analyzer.analyze_reading_velocity(
            &density,
            &ReadingContext {
                level: ReadingLevel::Beginner,
                ..ReadingContext::default()
            },
        );
        let poetry_phone = analyzer.analyze_reading_velocity(
            &density,
            &ReadingContext {
                genre: Genre::Poetry,
                small_screen: true,
                touch_device: true,
                ..ReadingContext::default()
            },
        );
        assert!(beginner < base);
        assert!(poetry_phone < beginner);
        assert!(poetry_phone >= 100.0);

        let fast = ContentDensityMetrics {
            reading_velocity: 350.0,
            ..ContentDensityMetrics::default()
        };
        let advanced_fiction = analyzer.analyze_reading_velocity(
            &fast,
            &ReadingContext {
                level: ReadingLevel::Advanced,
                genre: Genre::Fiction,
                ..ReadingContext::default()
            },
        );
        assert_eq!(advanced_fiction, 400.0);
    }

    #[test]
    fn test_load_halves_velocity_at_most() {
        let analyzer = ContentDensityAnalyzer::new();
        let loaded = ContentDensityMetrics {
            reading_velocity: 300.0,
            cognitive_load: 10.0,
            ..ContentDensityMetrics::default()
        };
        assert_eq!(
            analyzer.analyze_reading_velocity(&loaded, &ReadingContext::default()),
            150.0
        );
    }

    #[test]
    fn test_cognitive_load_structure_adds_load() {
        let analyzer = ContentDensityAnalyzer::new();
        let html = "<h1>A</h1><p>Although the data varies; results hold.</p><h3>B</h3>";
        let plain = analyzer.calculate_cognitive_load(html, None);
        let structure = DocumentStructure {
            heading_levels: vec![1, 3, 1, 3],
            visual_element_count: 2,
            paragraph_count: 1,
        };
        let structured = analyzer.calculate_cognitive_load(html, Some(&structure));
        assert!(structured > plain);
        assert!((0.0..=10.0).contains(&structured));
    }

    #[test]
    fn test_cognitive_load_orders_content() {
        let analyzer = ContentDensityAnalyzer::new();
        let easy = analyzer.calculate_cognitive_load("<p>The cat sat. The dog ran.</p>", None);
        let hard = analyzer.calculate_cognitive_load(TECHNICAL, None);
        assert!(hard > easy);
    }

    #[test]
    fn test_reading_flow_for_complex_content() {
        let analyzer = ContentDensityAnalyzer::new();
        let density = ContentDensityMetrics {
            complexity: Complexity::High,
            average_words_per_sentence: 28.0,
            cognitive_load: 8.0,
            technical_content_ratio: 0.4,
            reading_velocity: 200.0,
            ..ContentDensityMetrics::default()
        };
        let settings = PageCalculationSettings::default().with_typography(16.0, 1.8);
        let flow = analyzer.optimize_for_reading_flow(&density, &settings);
        assert!((flow.recommended_font_size - 17.6).abs() < 0.001);
        assert_eq!(flow.recommended_line_height, 2.0);
        assert_eq!(flow.recommended_words_per_page, 200);
        assert_eq!(flow.break_frequency, 1.3);
        assert!(flow.focus_mode_recommended);
        let reasons: Vec<PauseReason> =
            flow.pause_recommendations.iter().map(|p| p.reason).collect();
        assert_eq!(
            reasons,
            vec![
                PauseReason::HighCognitiveLoad,
                PauseReason::HighComplexity,
                PauseReason::TechnicalContent
            ]
        );
    }

    #[test]
    fn test_reading_flow_for_light_dialogue() {
        let analyzer = ContentDensityAnalyzer::new();
        let density = ContentDensityMetrics {
            complexity: Complexity::Low,
            average_words_per_sentence: 8.0,
            cognitive_load: 2.5,
            dialogue_ratio: 0.6,
            reading_velocity: 300.0,
            ..ContentDensityMetrics::default()
        };
        let flow = analyzer.optimize_for_reading_flow(&density, &PageCalculationSettings::default());
        assert!((flow.recommended_font_size - 15.2).abs() < 0.001);
        assert_eq!(flow.recommended_line_height, 1.6);
        assert_eq!(flow.recommended_words_per_page, 350);
        assert_eq!(flow.break_frequency, 0.8);
        assert!(!flow.focus_mode_recommended);
        assert!(flow.pause_recommendations.is_empty());
    }

    #[test]
    fn test_heuristic_classifier() {
        let c = HeuristicClassifier;
        assert_eq!(c.classify("\"Run!\" she shouted."), SegmentKind::Dialogue);
        assert_eq!(
            c.classify("Configure the HTTP API with JSON and XML over TCP."),
            SegmentKind::Technical
        );
        assert_eq!(
            c.classify("The bright golden fields glowed, soft and warm and beautiful."),
            SegmentKind::Descriptive
        );
        assert_eq!(
            c.classify("They walked to the market. Then they went home."),
            SegmentKind::Narrative
        );
        assert_eq!(c.classify("It is what it is."), SegmentKind::Mixed);
    }

    #[test]
    fn test_patterns_transitions_and_intensity() {
        let html = format!("{}{}{}", NARRATIVE, TECHNICAL, DIALOGUE);
        let patterns = ContentDensityAnalyzer::new().detect_content_patterns(&html);
        let kinds: Vec<SegmentKind> = patterns.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Narrative,
                SegmentKind::Technical,
                SegmentKind::Dialogue,
                SegmentKind::Dialogue
            ]
        );
        assert_eq!(patterns.transitions.len(), 2);
        assert_eq!(patterns.transitions[0].paragraph_index, 1);
        assert_eq!(patterns.transitions[0].abruptness, 0.8);
        assert_eq!(patterns.transitions[1].abruptness, 0.9);
        assert_eq!(patterns.intensity_map.len(), 4);
        assert!(patterns.intensity_map.iter().all(|i| (1..=10).contains(i)));
        // technical terms raise intensity over plain narrative
        assert!(patterns.intensity_map[1] > patterns.intensity_map[0]);
    }

    struct AlwaysTechnical;

    impl SegmentClassifier for AlwaysTechnical {
        fn classify(&self, _paragraph: &str) -> SegmentKind {
            SegmentKind::Technical
        }
    }

    #[test]
    fn test_custom_classifier_plugs_in() {
        let analyzer = ContentDensityAnalyzer::with_classifier(AlwaysTechnical);
        let patterns = analyzer.detect_content_patterns(DIALOGUE);
        assert!(patterns.segments.iter().all(|s| s.kind == SegmentKind::Technical));
        assert!(patterns.transitions.is_empty());
    }

    #[test]
    fn test_readability_assessment() {
        let analyzer = ContentDensityAnalyzer::new();
        let easy = analyzer.assess_readability_factors("<p>The cat sat. The dog ran.</p>");
        assert!(easy.flesch_reading_ease > 90.0);
        assert!(easy.difficulty_factors.is_empty());
        assert_eq!(easy.reading_time_minutes, 1);

        let hard = analyzer.assess_readability_factors(
            "<p>The comprehensive administrative reorganization was implemented \
             by institutional representatives. The constitutional modifications were \
             subsequently investigated.</p>",
        );
        assert!(hard.flesch_kincaid_grade > easy.flesch_kincaid_grade);
        assert!(hard.passive_voice_ratio > 0.2);
        let kinds: Vec<FactorKind> = hard.difficulty_factors.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&FactorKind::Vocabulary));
        assert!(kinds.contains(&FactorKind::Syntax));
    }

    #[test]
    fn test_structure_from_analysis() {
        let analysis = crate::analyzer::analyze_content(
            "<h1>One</h1><p>Text paragraph.</p><h2>Two</h2><img src=\"a.png\"/>",
        );
        let structure = DocumentStructure::from_analysis(&analysis);
        assert_eq!(structure.heading_levels, vec![1, 2]);
        assert_eq!(structure.visual_element_count, 1);
        assert_eq!(structure.paragraph_count, 1);
    }
}
