//! Pagination controller
//!
//! Ties analysis, density tuning and page breaking together for a whole
//! book. The controller owns the page-break cache, remembers the latest page
//! count of every chapter so global page numbers can be derived, and reports
//! coarse progress through an optional sink.
//!
//! With the `async` feature, [`PaginationController::calculate_page_breaks`]
//! debounces requests: a burst of calls (a reader dragging a font-size
//! slider, say) collapses into a single calculation once the burst goes
//! quiet. Exactly one caller owns the timer; later callers only replace the
//! pending request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::analyzer::ContentAnalyzer;
use crate::breaker::{BreakerState, SmartPageBreaker};
use crate::cache::{content_fingerprint, CacheKey, CacheStats, PageBreakCache};
use crate::density::ContentDensityAnalyzer;
use crate::model::{ContentAnalysis, PageBreakMap, PageBreakResult};
use crate::settings::{
    ControllerOptions, PageBreakOptimizationOptions, PageCalculationSettings,
    SettingsFingerprint, SmartPageBreakOptions, ViewportDimensions,
};

#[cfg(feature = "async")]
use crate::error::PaginationError;

/// One chapter as supplied by the reading system.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChapterContent {
    /// Chapter title
    pub title: String,
    /// Chapter markup
    pub content: String,
    /// Page count from an earlier pagination, if known
    pub pages: Option<usize>,
}

impl ChapterContent {
    /// Chapter without a page hint
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            pages: None,
        }
    }

    /// Attach a known page count
    pub fn with_page_hint(mut self, pages: usize) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// Coarse stage of a chapter calculation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PaginationPhase {
    /// Semantic elements and break candidates (10-30%)
    StructuralAnalysis,
    /// Density and reading-flow tuning (30-50%)
    DensityAnalysis,
    /// Baseline page breaking (50-75%)
    BreakPointSearch,
    /// Optimization passes (75-90%)
    PageAssembly,
    /// Building and caching the map (90-100%)
    Finalization,
}

impl PaginationPhase {
    /// Progress percentages this phase spans
    pub fn percent_range(&self) -> (f32, f32) {
        match self {
            PaginationPhase::StructuralAnalysis => (10.0, 30.0),
            PaginationPhase::DensityAnalysis => (30.0, 50.0),
            PaginationPhase::BreakPointSearch => (50.0, 75.0),
            PaginationPhase::PageAssembly => (75.0, 90.0),
            PaginationPhase::Finalization => (90.0, 100.0),
        }
    }
}

/// A progress report for one chapter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaginationProgress {
    /// Chapter being calculated
    pub chapter_index: usize,
    /// Current phase
    pub phase: PaginationPhase,
    /// Overall completion, 0-100
    pub percent: f32,
}

type ProgressSink = Arc<dyn Fn(PaginationProgress) + Send + Sync>;

struct ControllerState {
    cache: PageBreakCache,
    current_settings: Option<PageCalculationSettings>,
    page_counts: BTreeMap<usize, usize>,
    page_hints: BTreeMap<usize, usize>,
}

impl ControllerState {
    fn page_count(&self, chapter_index: usize) -> usize {
        self.page_counts
            .get(&chapter_index)
            .or_else(|| self.page_hints.get(&chapter_index))
            .copied()
            .unwrap_or(0)
    }

    fn global_offset(&self, chapter_index: usize) -> usize {
        (0..chapter_index).map(|idx| self.page_count(idx)).sum()
    }

    /// Return `map` with global numbers matching the current fold, replacing
    /// the cached copy when they were stale.
    fn stamped(&mut self, key: CacheKey, map: Arc<PageBreakMap>) -> Arc<PageBreakMap> {
        let offset = self.global_offset(key.chapter_index);
        let current = map
            .pages
            .first()
            .map(|page| page.global_page_number - page.page_number);
        if current.is_none() || current == Some(offset) {
            return map;
        }
        let restamped = Arc::new(map.restamped(offset));
        self.cache.replace(&key, restamped.clone());
        restamped
    }

    fn restamp_after(&mut self, chapter_index: usize, fingerprint: SettingsFingerprint, now: Instant) {
        for key in self.cache.keys_for_settings(fingerprint) {
            if key.chapter_index <= chapter_index {
                continue;
            }
            if let Some(map) = self.cache.peek(&key, now) {
                self.stamped(key, map);
            }
        }
    }
}

/// A calculation that missed the cache
struct Job<'a> {
    content: &'a str,
    chapter_index: usize,
    settings: PageCalculationSettings,
    content_crc: u32,
    global_offset: usize,
}

enum Lookup<'a> {
    Hit(Arc<PageBreakMap>),
    Miss(Job<'a>),
}

/// Book-level pagination entry point.
///
/// # Example
/// ```
/// use mu_pager::controller::{ChapterContent, PaginationController};
/// use mu_pager::settings::{ControllerOptions, PageCalculationSettings, ViewportDimensions};
///
/// let controller = PaginationController::new(ControllerOptions::default());
/// let chapter = ChapterContent::new("One", "<p>A short opening chapter.</p>");
/// let settings = PageCalculationSettings::default();
/// let map = controller.calculate_now(&chapter, 0, &settings, ViewportDimensions::new(800.0, 600.0));
/// assert_eq!(map.page_count(), 1);
/// assert!(controller.get_page_break_map(0).is_some());
/// ```
pub struct PaginationController {
    options: ControllerOptions,
    break_options: SmartPageBreakOptions,
    optimization: PageBreakOptimizationOptions,
    state: Mutex<ControllerState>,
    progress: Option<ProgressSink>,
    #[cfg(feature = "async")]
    coalescer: Mutex<coalesce::Coalescer>,
}

impl fmt::Debug for PaginationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationController")
            .field("options", &self.options)
            .field("break_options", &self.break_options)
            .field("optimization", &self.optimization)
            .finish_non_exhaustive()
    }
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl PaginationController {
    /// Controller with default break and optimization options
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            options,
            break_options: SmartPageBreakOptions::default(),
            optimization: PageBreakOptimizationOptions::default(),
            state: Mutex::new(ControllerState {
                cache: PageBreakCache::new(options.cache_ttl, options.cache_capacity),
                current_settings: None,
                page_counts: BTreeMap::new(),
                page_hints: BTreeMap::new(),
            }),
            progress: None,
            #[cfg(feature = "async")]
            coalescer: Mutex::new(coalesce::Coalescer::default()),
        }
    }

    /// Replace the structural break options
    pub fn with_break_options(mut self, break_options: SmartPageBreakOptions) -> Self {
        self.break_options = break_options;
        self
    }

    /// Replace the optimization bounds
    pub fn with_optimization(mut self, optimization: PageBreakOptimizationOptions) -> Self {
        self.optimization = optimization;
        self
    }

    /// Receive progress reports for every calculation
    pub fn with_progress_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(PaginationProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(sink));
        self
    }

    /// Controller options in use
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Record page hints for chapters in book order
    pub fn register_chapters(&self, chapters: &[ChapterContent]) {
        let mut state = self.lock_state();
        for (idx, chapter) in chapters.iter().enumerate() {
            if let Some(pages) = chapter.pages {
                state.page_hints.insert(idx, pages);
            }
        }
    }

    /// Paginate a chapter immediately, or return its cached map.
    ///
    /// `dimensions` replaces the viewport in `settings`.
    pub fn calculate_now(
        &self,
        chapter: &ChapterContent,
        chapter_index: usize,
        settings: &PageCalculationSettings,
        dimensions: ViewportDimensions,
    ) -> Arc<PageBreakMap> {
        let settings = settings.clone().with_viewport(dimensions);
        match self.lookup(chapter, chapter_index, settings) {
            Lookup::Hit(map) => map,
            Lookup::Miss(job) => {
                let analysis = self.run_structure(&job);
                let break_frequency = self.run_density(&job);
                let result = self.run_pages(&job, &analysis, break_frequency);
                self.finish(&job, analysis, result)
            }
        }
    }

    /// Cached map for a chapter under the most recently requested settings
    pub fn get_page_break_map(&self, chapter_index: usize) -> Option<Arc<PageBreakMap>> {
        let mut state = self.lock_state();
        let settings = state.current_settings.as_ref()?;
        let key = CacheKey::new(chapter_index, settings.fingerprint());
        let map = state.cache.peek(&key, now())?;
        Some(state.stamped(key, map))
    }

    /// Drop cached maps for one chapter, or for all chapters with `None`.
    ///
    /// Returns the number of maps removed. Known page counts are kept for
    /// global numbering until the chapters are recalculated.
    pub fn invalidate_cache(&self, chapter_index: Option<usize>) -> usize {
        let removed = self.lock_state().cache.invalidate(chapter_index);
        match chapter_index {
            Some(idx) => log::debug!("invalidated {} page maps for chapter {}", removed, idx),
            None => log::debug!("invalidated all {} page maps", removed),
        }
        removed
    }

    /// Pages before `chapter_index`, from the latest known page counts
    pub fn global_page_offset(&self, chapter_index: usize) -> usize {
        self.lock_state().global_offset(chapter_index)
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.lock_state().cache.stats()
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, chapter_index: usize, phase: PaginationPhase, percent: f32) {
        if let Some(sink) = &self.progress {
            sink(PaginationProgress {
                chapter_index,
                phase,
                percent,
            });
        }
    }

    fn lookup<'a>(
        &self,
        chapter: &'a ChapterContent,
        chapter_index: usize,
        settings: PageCalculationSettings,
    ) -> Lookup<'a> {
        let content_crc = content_fingerprint(&chapter.content);
        let mut state = self.lock_state();
        state.current_settings = Some(settings.clone());
        if let Some(pages) = chapter.pages {
            state.page_hints.insert(chapter_index, pages);
        }
        let key = CacheKey::new(chapter_index, settings.fingerprint());
        if let Some(map) = state.cache.get(&key, content_crc, now()) {
            log::debug!("page map cache hit for chapter {}", chapter_index);
            return Lookup::Hit(state.stamped(key, map));
        }
        Lookup::Miss(Job {
            content: &chapter.content,
            chapter_index,
            settings,
            content_crc,
            global_offset: state.global_offset(chapter_index),
        })
    }

    fn run_structure(&self, job: &Job<'_>) -> ContentAnalysis {
        self.report(job.chapter_index, PaginationPhase::StructuralAnalysis, 10.0);
        let analysis = ContentAnalyzer::new(self.break_options.clone()).analyze_content(job.content);
        self.report(job.chapter_index, PaginationPhase::StructuralAnalysis, 30.0);
        analysis
    }

    fn run_density(&self, job: &Job<'_>) -> f32 {
        let analyzer = ContentDensityAnalyzer::new();
        let density = analyzer.calculate_content_density(job.content);
        let flow = analyzer.optimize_for_reading_flow(&density, &job.settings);
        log::trace!(
            "chapter {}: cognitive load {:.1}, break frequency {}",
            job.chapter_index,
            density.cognitive_load,
            flow.break_frequency
        );
        self.report(job.chapter_index, PaginationPhase::DensityAnalysis, 50.0);
        flow.break_frequency
    }

    fn run_pages(&self, job: &Job<'_>, analysis: &ContentAnalysis, break_frequency: f32) -> PageBreakResult {
        let breaker = SmartPageBreaker::new(
            job.settings.clone(),
            self.break_options.clone(),
            Some(self.optimization),
        )
        .with_break_frequency(break_frequency);
        let passes = self.optimization.max_iterations.max(1) as f32;
        breaker.generate_optimal_pages_observed(
            job.content,
            analysis,
            job.chapter_index,
            job.global_offset,
            &mut |state| {
                let (phase, percent) = match state {
                    BreakerState::Analyzing => (PaginationPhase::BreakPointSearch, 50.0),
                    BreakerState::BaselinePaginated => (PaginationPhase::BreakPointSearch, 75.0),
                    BreakerState::Optimizing(n) => (
                        PaginationPhase::PageAssembly,
                        75.0 + 15.0 * (n as f32 / passes).min(1.0),
                    ),
                    BreakerState::Finalized => (PaginationPhase::PageAssembly, 90.0),
                };
                self.report(job.chapter_index, phase, percent);
            },
        )
    }

    fn finish(&self, job: &Job<'_>, analysis: ContentAnalysis, result: PageBreakResult) -> Arc<PageBreakMap> {
        self.report(job.chapter_index, PaginationPhase::Finalization, 90.0);
        let map = Arc::new(PageBreakMap {
            chapter_index: job.chapter_index,
            pages: result.pages,
            break_points: analysis.break_points,
            last_calculated: unix_millis(),
            settings: job.settings.clone(),
            average_quality: result.average_quality_score,
        });

        let now = now();
        let fingerprint = job.settings.fingerprint();
        {
            let mut state = self.lock_state();
            let previous = state.page_count(job.chapter_index);
            state.page_counts.insert(job.chapter_index, map.page_count());
            state.cache.insert(
                CacheKey::new(job.chapter_index, fingerprint),
                map.clone(),
                job.content_crc,
                now,
            );
            if previous != map.page_count() {
                state.restamp_after(job.chapter_index, fingerprint, now);
            }
        }
        log::debug!(
            "chapter {} paginated: {} pages from global page {}",
            job.chapter_index,
            map.page_count(),
            job.global_offset
        );
        self.report(job.chapter_index, PaginationPhase::Finalization, 100.0);
        map
    }
}

/// Current instant on the runtime clock when one is active
fn now() -> Instant {
    #[cfg(feature = "async")]
    {
        tokio::time::Instant::now().into_std()
    }
    #[cfg(not(feature = "async"))]
    {
        Instant::now()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(feature = "async")]
mod coalesce {
    use std::sync::Arc;

    use tokio::sync::oneshot;
    use tokio::time::Instant;

    use crate::controller::ChapterContent;
    use crate::error::PaginationError;
    use crate::model::PageBreakMap;
    use crate::settings::PageCalculationSettings;

    pub(super) type Reply = oneshot::Sender<Result<Arc<PageBreakMap>, PaginationError>>;

    pub(super) struct PendingRequest {
        pub ticket: u64,
        pub chapter: ChapterContent,
        pub chapter_index: usize,
        pub settings: PageCalculationSettings,
        pub reply: Reply,
    }

    /// Pending-request slot plus the single debounce timer
    #[derive(Default)]
    pub(super) struct Coalescer {
        pub next_ticket: u64,
        pub pending: Option<PendingRequest>,
        pub deadline: Option<Instant>,
        pub timer_armed: bool,
    }

    pub(super) enum Fire {
        /// Deadline moved; sleep again
        Wait(Instant),
        /// Timer expired with this request (if any) pending
        Run(Option<PendingRequest>),
    }
}

#[cfg(feature = "async")]
struct TimerGuard<'a> {
    controller: &'a PaginationController,
    armed: bool,
}

#[cfg(feature = "async")]
impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut coalescer = self.controller.lock_coalescer();
        coalescer.timer_armed = false;
        coalescer.deadline = None;
        if let Some(request) = coalescer.pending.take() {
            log::warn!(
                "pagination request {} abandoned with its timer",
                request.ticket
            );
        }
    }
}

#[cfg(feature = "async")]
impl PaginationController {
    /// Debounced pagination of one chapter.
    ///
    /// Cache hits return immediately. Otherwise the request waits for the
    /// debounce period; a newer request arriving meanwhile replaces it, and
    /// the replaced caller gets [`PaginationError::Superseded`]. If the
    /// future driving the timer is dropped, waiting callers get
    /// [`PaginationError::CoalescerClosed`].
    pub async fn calculate_page_breaks(
        &self,
        chapter: &ChapterContent,
        chapter_index: usize,
        settings: &PageCalculationSettings,
        dimensions: ViewportDimensions,
    ) -> Result<Arc<PageBreakMap>, PaginationError> {
        let settings = settings.clone().with_viewport(dimensions);
        if let Lookup::Hit(map) = self.lookup(chapter, chapter_index, settings.clone()) {
            return Ok(map);
        }

        let (reply, receiver) = tokio::sync::oneshot::channel();
        let owns_timer = self.enqueue(coalesce::PendingRequest {
            ticket: 0,
            chapter: chapter.clone(),
            chapter_index,
            settings,
            reply,
        });
        if owns_timer {
            self.drive_timer().await;
        }
        receiver.await.map_err(|_| PaginationError::CoalescerClosed)?
    }

    fn lock_coalescer(&self) -> MutexGuard<'_, coalesce::Coalescer> {
        self.coalescer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Place a request in the pending slot; true if the caller must run the timer.
    fn enqueue(&self, mut request: coalesce::PendingRequest) -> bool {
        let mut coalescer = self.lock_coalescer();
        coalescer.next_ticket += 1;
        request.ticket = coalescer.next_ticket;
        let ticket = request.ticket;
        if let Some(replaced) = coalescer.pending.replace(request) {
            log::debug!(
                "pagination request {} superseded by {}",
                replaced.ticket,
                ticket
            );
            let _ = replaced.reply.send(Err(PaginationError::Superseded {
                ticket: replaced.ticket,
                completed: ticket,
            }));
        }
        coalescer.deadline = Some(tokio::time::Instant::now() + self.options.debounce);
        !std::mem::replace(&mut coalescer.timer_armed, true)
    }

    fn poll_timer(&self) -> coalesce::Fire {
        let mut coalescer = self.lock_coalescer();
        match coalescer.deadline {
            Some(deadline) if tokio::time::Instant::now() < deadline => {
                coalesce::Fire::Wait(deadline)
            }
            _ => {
                coalescer.timer_armed = false;
                coalescer.deadline = None;
                coalesce::Fire::Run(coalescer.pending.take())
            }
        }
    }

    async fn drive_timer(&self) {
        let mut guard = TimerGuard {
            controller: self,
            armed: true,
        };
        let request = loop {
            match self.poll_timer() {
                coalesce::Fire::Wait(deadline) => tokio::time::sleep_until(deadline).await,
                coalesce::Fire::Run(request) => break request,
            }
        };
        guard.armed = false;

        let Some(request) = request else {
            return;
        };
        let map = self
            .calculate_cooperatively(&request.chapter, request.chapter_index, request.settings)
            .await;
        let _ = request.reply.send(Ok(map));
    }

    /// The synchronous pipeline with yields between phases
    async fn calculate_cooperatively(
        &self,
        chapter: &ChapterContent,
        chapter_index: usize,
        settings: PageCalculationSettings,
    ) -> Arc<PageBreakMap> {
        let job = match self.lookup(chapter, chapter_index, settings) {
            Lookup::Hit(map) => return map,
            Lookup::Miss(job) => job,
        };
        let analysis = self.run_structure(&job);
        tokio::task::yield_now().await;
        let break_frequency = self.run_density(&job);
        tokio::task::yield_now().await;
        let result = self.run_pages(&job, &analysis, break_frequency);
        tokio::task::yield_now().await;
        self.finish(&job, analysis, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(paragraphs: usize) -> ChapterContent {
        let content: String = (0..paragraphs)
            .map(|i| {
                format!(
                    "<p>Paragraph {} {}ends here.</p>\n",
                    i,
                    "text ".repeat(46)
                )
            })
            .collect();
        ChapterContent::new(format!("Chapter of {}", paragraphs), content)
    }

    fn recorder() -> (Arc<Mutex<Vec<PaginationProgress>>>, impl Fn(PaginationProgress) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        (events, move |p| sink_events.lock().unwrap().push(p))
    }

    #[test]
    fn test_calculate_now_caches() {
        let controller = PaginationController::default();
        let settings = PageCalculationSettings::default();
        let dims = ViewportDimensions::REFERENCE;
        let first = controller.calculate_now(&chapter(20), 0, &settings, dims);
        let second = controller.calculate_now(&chapter(20), 0, &settings, dims);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.page_count() >= 2);
        assert_eq!(controller.cache_stats().hits, 1);
    }

    #[test]
    fn test_dimensions_override_viewport() {
        let controller = PaginationController::default();
        let dims = ViewportDimensions::new(640.0, 480.0);
        let map = controller.calculate_now(&chapter(3), 0, &PageCalculationSettings::default(), dims);
        assert_eq!(map.settings.viewport, dims);
    }

    #[test]
    fn test_changed_content_recalculates() {
        let controller = PaginationController::default();
        let settings = PageCalculationSettings::default();
        let dims = ViewportDimensions::REFERENCE;
        let short = controller.calculate_now(&chapter(2), 0, &settings, dims);
        let long = controller.calculate_now(&chapter(20), 0, &settings, dims);
        assert!(!Arc::ptr_eq(&short, &long));
        assert!(long.page_count() > short.page_count());
    }

    #[test]
    fn test_map_follows_latest_settings() {
        let controller = PaginationController::default();
        let dims = ViewportDimensions::REFERENCE;
        let small = PageCalculationSettings::default();
        let large = PageCalculationSettings::default().with_typography(24.0, 1.8);
        controller.calculate_now(&chapter(20), 0, &small, dims);
        assert_eq!(controller.get_page_break_map(0).unwrap().settings.font_size, 16.0);
        controller.calculate_now(&chapter(20), 0, &large, dims);
        assert_eq!(controller.get_page_break_map(0).unwrap().settings.font_size, 24.0);
        assert!(controller.get_page_break_map(1).is_none());
    }

    #[test]
    fn test_global_numbers_follow_earlier_chapters() {
        let controller = PaginationController::default();
        let settings = PageCalculationSettings::default();
        let dims = ViewportDimensions::REFERENCE;

        let second = controller.calculate_now(&chapter(20), 1, &settings, dims);
        assert_eq!(second.pages[0].global_page_number, 0);

        let first = controller.calculate_now(&chapter(20), 0, &settings, dims);
        assert_eq!(controller.global_page_offset(1), first.page_count());
        let restamped = controller.get_page_break_map(1).unwrap();
        assert_eq!(restamped.pages[0].global_page_number, first.page_count());
        assert_eq!(restamped.pages[0].page_number, 0);
    }

    #[test]
    fn test_page_hints_seed_global_offsets() {
        let controller = PaginationController::default();
        controller.register_chapters(&[
            ChapterContent::new("One", "").with_page_hint(4),
            ChapterContent::new("Two", "").with_page_hint(6),
        ]);
        assert_eq!(controller.global_page_offset(2), 10);
        let map = controller.calculate_now(
            &chapter(3),
            2,
            &PageCalculationSettings::default(),
            ViewportDimensions::REFERENCE,
        );
        assert_eq!(map.pages[0].global_page_number, 10);
    }

    #[test]
    fn test_invalidate_cache() {
        let controller = PaginationController::default();
        let settings = PageCalculationSettings::default();
        let dims = ViewportDimensions::REFERENCE;
        for idx in 0..3 {
            controller.calculate_now(&chapter(3), idx, &settings, dims);
        }
        assert_eq!(controller.invalidate_cache(Some(1)), 1);
        assert!(controller.get_page_break_map(1).is_none());
        assert!(controller.get_page_break_map(0).is_some());
        assert_eq!(controller.invalidate_cache(None), 2);
        assert!(controller.get_page_break_map(0).is_none());
        // counts survive for numbering
        assert!(controller.global_page_offset(3) >= 3);
    }

    #[test]
    fn test_progress_phases_in_order() {
        let (events, sink) = recorder();
        let controller = PaginationController::default().with_progress_sink(sink);
        controller.calculate_now(
            &chapter(20),
            5,
            &PageCalculationSettings::default(),
            ViewportDimensions::REFERENCE,
        );
        let events = events.lock().unwrap();
        assert_eq!(events.first().unwrap().percent, 10.0);
        assert_eq!(events.last().unwrap().percent, 100.0);
        assert_eq!(events.last().unwrap().phase, PaginationPhase::Finalization);
        for pair in events.windows(2) {
            assert!(pair[0].percent <= pair[1].percent);
            assert!(pair[0].phase <= pair[1].phase);
        }
        assert!(events.iter().all(|p| p.chapter_index == 5));
        for p in events.iter() {
            let (lo, hi) = p.phase.percent_range();
            assert!(p.percent >= lo && p.percent <= hi);
        }
    }

    #[test]
    fn test_empty_chapter_gives_empty_map() {
        let controller = PaginationController::default();
        let map = controller.calculate_now(
            &ChapterContent::new("Blank", "  "),
            0,
            &PageCalculationSettings::default(),
            ViewportDimensions::REFERENCE,
        );
        assert_eq!(map.page_count(), 0);
        assert_eq!(controller.global_page_offset(1), 0);
    }

    #[cfg(feature = "async")]
    mod debounce {
        use super::*;
        use crate::error::PaginationError;
        use std::time::Duration;

        #[tokio::test(start_paused = true)]
        async fn test_single_request_waits_for_debounce() {
            let controller = PaginationController::default();
            let started = tokio::time::Instant::now();
            let map = controller
                .calculate_page_breaks(
                    &chapter(10),
                    0,
                    &PageCalculationSettings::default(),
                    ViewportDimensions::REFERENCE,
                )
                .await
                .unwrap();
            assert!(started.elapsed() >= Duration::from_millis(300));
            assert!(map.page_count() >= 1);

            let again = tokio::time::Instant::now();
            let cached = controller
                .calculate_page_breaks(
                    &chapter(10),
                    0,
                    &PageCalculationSettings::default(),
                    ViewportDimensions::REFERENCE,
                )
                .await
                .unwrap();
            assert_eq!(again.elapsed(), Duration::ZERO);
            assert!(Arc::ptr_eq(&map, &cached));
        }

        #[tokio::test(start_paused = true)]
        async fn test_burst_coalesces_into_last_request() {
            let (events, sink) = recorder();
            let controller = PaginationController::default().with_progress_sink(sink);
            let content = chapter(10);
            let dims = ViewportDimensions::REFERENCE;
            let s16 = PageCalculationSettings::default();
            let s17 = PageCalculationSettings::default().with_typography(17.0, 1.6);
            let s18 = PageCalculationSettings::default().with_typography(18.0, 1.6);

            let (a, b, c) = tokio::join!(
                controller.calculate_page_breaks(&content, 0, &s16, dims),
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    controller.calculate_page_breaks(&content, 0, &s17, dims).await
                },
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    controller.calculate_page_breaks(&content, 0, &s18, dims).await
                },
            );

            assert_eq!(
                a,
                Err(PaginationError::Superseded {
                    ticket: 1,
                    completed: 2
                })
            );
            assert_eq!(
                b,
                Err(PaginationError::Superseded {
                    ticket: 2,
                    completed: 3
                })
            );
            assert_eq!(c.unwrap().settings.font_size, 18.0);
            let runs = events
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.percent == 100.0)
                .count();
            assert_eq!(runs, 1);
            assert_eq!(controller.get_page_break_map(0).unwrap().settings.font_size, 18.0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_abandoned_timer_closes_waiters() {
            let controller = PaginationController::default();
            let content = chapter(5);
            let dims = ViewportDimensions::REFERENCE;
            let s16 = PageCalculationSettings::default();
            let s20 = PageCalculationSettings::default().with_typography(20.0, 1.6);

            let mut owner = Box::pin(controller.calculate_page_breaks(&content, 0, &s16, dims));
            assert!(tokio::time::timeout(Duration::from_millis(10), &mut owner)
                .await
                .is_err());

            let (waiter, _) = tokio::join!(
                controller.calculate_page_breaks(&content, 0, &s20, dims),
                async move { drop(owner) },
            );
            assert_eq!(waiter, Err(PaginationError::CoalescerClosed));

            // a fresh request arms a new timer
            let map = controller
                .calculate_page_breaks(&content, 0, &s20, dims)
                .await
                .unwrap();
            assert_eq!(map.settings.font_size, 20.0);
        }
    }
}
