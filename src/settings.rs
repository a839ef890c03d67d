//! Reading settings and pagination options
//!
//! Plain configuration values consumed by the analyzer, the page breaker
//! and the controller. The core never mutates them; callers replace them
//! wholesale.

use core::time::Duration;

/// Viewport or container size in layout pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportDimensions {
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
}

impl ViewportDimensions {
    /// Reference screen the default words-per-page is tuned for
    pub const REFERENCE: ViewportDimensions = ViewportDimensions {
        width: 1920.0,
        height: 1080.0,
    };

    /// Create dimensions
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Area in square pixels, never negative
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

impl Default for ViewportDimensions {
    fn default() -> Self {
        Self::REFERENCE
    }
}

/// How pages are laid out on screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PageLayout {
    /// One page fills the viewport
    #[default]
    Single,
    /// Two facing pages share the viewport
    Spread,
}

impl PageLayout {
    /// Pages visible at once
    pub fn pages_per_view(&self) -> u32 {
        match self {
            PageLayout::Single => 1,
            PageLayout::Spread => 2,
        }
    }
}

/// Font metrics and viewport used to size pages.
#[derive(Clone, Debug, PartialEq)]
pub struct PageCalculationSettings {
    /// Font size in pixels
    pub font_size: f32,
    /// Line height as a multiple of font size
    pub line_height: f32,
    /// Page margin in pixels
    pub margin: f32,
    /// Viewport size
    pub viewport: ViewportDimensions,
    /// Single page or two-page spread
    pub layout: PageLayout,
    /// Optional fixed column width in pixels
    pub column_width: Option<f32>,
}

impl Default for PageCalculationSettings {
    fn default() -> Self {
        Self {
            font_size: Self::DEFAULT_FONT_SIZE,
            line_height: Self::DEFAULT_LINE_HEIGHT,
            margin: 40.0,
            viewport: ViewportDimensions::REFERENCE,
            layout: PageLayout::Single,
            column_width: None,
        }
    }
}

impl PageCalculationSettings {
    /// Font size the default words-per-page is tuned for
    pub const DEFAULT_FONT_SIZE: f32 = 16.0;
    /// Line height the default words-per-page is tuned for
    pub const DEFAULT_LINE_HEIGHT: f32 = 1.6;

    /// Settings for a given viewport, defaults elsewhere
    pub fn for_viewport(width: f32, height: f32) -> Self {
        Self {
            viewport: ViewportDimensions::new(width, height),
            ..Self::default()
        }
    }

    /// Replace the viewport
    pub fn with_viewport(mut self, viewport: ViewportDimensions) -> Self {
        self.viewport = viewport;
        self
    }

    /// Replace font size and line height
    pub fn with_typography(mut self, font_size: f32, line_height: f32) -> Self {
        self.font_size = font_size;
        self.line_height = line_height;
        self
    }

    /// Replace the page layout
    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Area available to a single page
    pub fn page_area(&self) -> f32 {
        let width = match self.column_width {
            Some(column) if column > 0.0 => column.min(self.viewport.width),
            _ => self.viewport.width / self.layout.pages_per_view() as f32,
        };
        width.max(0.0) * self.viewport.height.max(0.0)
    }

    /// How much text a line of this typography holds relative to defaults
    pub fn typography_factor(&self) -> f32 {
        let font = if self.font_size > 0.0 {
            Self::DEFAULT_FONT_SIZE / self.font_size
        } else {
            1.0
        };
        let line = if self.line_height > 0.0 {
            Self::DEFAULT_LINE_HEIGHT / self.line_height
        } else {
            1.0
        };
        font * line
    }

    /// Stable fingerprint for all pagination-affecting settings
    pub fn fingerprint(&self) -> SettingsFingerprint {
        let payload = format!("{:?}", self);
        SettingsFingerprint::from_bytes(payload.as_bytes())
    }
}

/// Deterministic hash of a settings snapshot, used in cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingsFingerprint(pub [u64; 2]);

impl SettingsFingerprint {
    /// Build a fingerprint from arbitrary payload bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        fn fnv64(seed: u64, payload: &[u8]) -> u64 {
            let mut hash = seed;
            for b in payload {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            hash
        }
        Self([
            fnv64(0xcbf29ce484222325, bytes),
            fnv64(0x9e3779b97f4a7c15, bytes),
        ])
    }
}

/// Structural rules for choosing break points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmartPageBreakOptions {
    /// Smallest page the breaker aims for (the final page may be shorter)
    pub minimum_words_per_page: usize,
    /// Largest page the breaker allows
    pub maximum_words_per_page: usize,
    /// Avoid breaks that do not end a sentence
    pub respect_sentences: bool,
    /// Prefer paragraph boundaries over mid-paragraph breaks
    pub respect_paragraphs: bool,
    /// Keep headings with the content that follows
    pub respect_headings: bool,
    /// Keep images on the page that introduces them
    pub respect_images: bool,
    /// Never split tables
    pub respect_tables: bool,
    /// Never split block quotes
    pub respect_quotes: bool,
    /// Never split code blocks
    pub respect_code_blocks: bool,
    /// Simple selectors (`tag`, `.class`, `tag.class`) that earn a bonus
    pub preferred_break_elements: Vec<String>,
}

impl Default for SmartPageBreakOptions {
    fn default() -> Self {
        Self {
            minimum_words_per_page: 150,
            maximum_words_per_page: 400,
            respect_sentences: true,
            respect_paragraphs: true,
            respect_headings: true,
            respect_images: true,
            respect_tables: true,
            respect_quotes: true,
            respect_code_blocks: true,
            preferred_break_elements: ["h1", "h2", "h3", "p", "blockquote", "hr"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SmartPageBreakOptions {
    /// Small pages for phones and narrow columns
    pub fn compact() -> Self {
        Self {
            minimum_words_per_page: 80,
            maximum_words_per_page: 250,
            ..Self::default()
        }
    }

    /// Large pages for desktop reading
    pub fn relaxed() -> Self {
        Self {
            minimum_words_per_page: 200,
            maximum_words_per_page: 450,
            ..Self::default()
        }
    }

    /// Replace the words-per-page bounds
    pub fn with_word_range(mut self, minimum: usize, maximum: usize) -> Self {
        self.minimum_words_per_page = minimum;
        self.maximum_words_per_page = maximum.max(minimum);
        self
    }
}

/// Bounds for the iterative optimization loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageBreakOptimizationOptions {
    /// Upper bound on optimization passes after the baseline
    pub max_iterations: u8,
    /// Average quality at which optimization stops early
    pub quality_threshold: f32,
    /// Tolerated relative page-size deviation from target
    pub allowable_page_size_variation: f32,
    /// Run the optimization loop at all
    pub enable_advanced_optimization: bool,
}

impl Default for PageBreakOptimizationOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            quality_threshold: 7.0,
            allowable_page_size_variation: 0.25,
            enable_advanced_optimization: true,
        }
    }
}

impl PageBreakOptimizationOptions {
    /// Baseline pass only
    pub fn disabled() -> Self {
        Self {
            enable_advanced_optimization: false,
            ..Self::default()
        }
    }
}

/// Cache and scheduling policy for the pagination controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Quiet period before a recalculation request runs
    pub debounce: Duration,
    /// Age after which a cached map is recomputed
    pub cache_ttl: Duration,
    /// Maximum cached maps; least recently used entries go first
    pub cache_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            cache_ttl: Duration::from_secs(5 * 60),
            cache_capacity: 64,
        }
    }
}
