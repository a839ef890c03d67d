//! mu-pager -- Content-aware pagination for EPUB chapters
//!
//! Splits chapter markup into reader pages that respect the content's
//! structure: headings stay with the text they introduce, tables and code
//! blocks are not cut in half, and page sizes adapt to how dense the prose
//! is and to the reader's typography.
//!
//! # Pipeline
//!
//! 1. [`analyzer`] walks the markup and ranks break candidates.
//! 2. [`density`] estimates reading velocity and cognitive load, which
//!    tunes how often pages should break.
//! 3. [`breaker`] produces a baseline pagination and optimizes it.
//! 4. [`controller`] caches results per chapter and settings, keeps global
//!    page numbers consistent across chapters and, with the `async`
//!    feature, debounces bursts of recalculation requests.
//!
//! # Features
//!
//! - `async` (default) -- debounced [`PaginationController::calculate_page_breaks`]
//! - `cli` -- the `mu-pager` inspection binary
//!
//! # Offsets
//!
//! Page and break-point offsets are byte offsets into the chapter markup as
//! given. Semantic element offsets count characters of the flattened text.

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod analyzer;
pub mod breaker;
pub mod cache;
pub mod controller;
pub mod density;
pub mod error;
pub mod markup;
pub mod model;
pub mod readability;
pub mod settings;

mod page_scan;

// Re-export key types for convenience
pub use analyzer::{analyze_content, ContentAnalyzer};
pub use breaker::{BreakerState, SmartPageBreaker};
pub use cache::{CacheKey, CacheStats, PageBreakCache};
pub use controller::{ChapterContent, PaginationController, PaginationPhase, PaginationProgress};
pub use density::{
    calculate_content_density, Complexity, ContentDensityAnalyzer, ContentDensityMetrics,
    ContentPatterns, ReadabilityAssessment, ReadingContext, ReadingFlowOptimizations,
    SegmentClassifier, SegmentKind,
};
pub use error::PaginationError;
pub use model::{
    BreakPointType, ContentAnalysis, ContentMetrics, Density, ElementType, IssueKind,
    PageBreakIssue, PageBreakMap, PageBreakPoint, PageBreakResult, PageInfo, SemanticElement,
    Severity,
};
pub use readability::TextStatistics;
pub use settings::{
    ControllerOptions, PageBreakOptimizationOptions, PageCalculationSettings, PageLayout,
    SmartPageBreakOptions, ViewportDimensions,
};
