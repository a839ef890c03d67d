use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use mu_pager::analyzer::ContentAnalyzer;
use mu_pager::breaker::SmartPageBreaker;
use mu_pager::controller::{ChapterContent, PaginationController};
use mu_pager::density::ContentDensityAnalyzer;
use mu_pager::settings::{
    ControllerOptions, PageBreakOptimizationOptions, PageCalculationSettings, SmartPageBreakOptions,
    ViewportDimensions,
};

#[derive(Clone)]
struct Fixture {
    key: &'static str,
    html: String,
}

fn fixtures() -> Vec<Fixture> {
    let sentence = "The lamps along the harbour were lit one by one as the tide turned. ";
    let novel: String = (0..400)
        .map(|i| {
            if i % 40 == 0 {
                format!("<h2>Part {}</h2>", i / 40 + 1)
            } else {
                format!("<p>{}</p>\n", sentence.repeat(3 + i % 5))
            }
        })
        .collect();
    let dialogue: String = (0..600)
        .map(|i| format!("<p>\"Are you coming, {}?\" she asked. \"Not yet,\" he replied.</p>\n", i))
        .collect();
    let technical: String = (0..120)
        .map(|i| {
            format!(
                "<h3>Section {}</h3><p>The API returns JSON via parseConfig() with 3.5 ms latency; \
                 configure the HTTP client accordingly.</p><pre>let cfg = load_{}();\n</pre>\
                 <table><tr><td>key</td><td>{}</td></tr></table>",
                i, i, i
            )
        })
        .collect();
    let run_on = format!("<p>{}</p>", "an unbroken stream of words without structure ".repeat(1500));

    vec![
        Fixture {
            key: "novel",
            html: novel,
        },
        Fixture {
            key: "dialogue",
            html: dialogue,
        },
        Fixture {
            key: "technical",
            html: technical,
        },
        Fixture {
            key: "run-on",
            html: run_on,
        },
    ]
}

const WARMUP_ITERS: usize = 2;
const MEASURE_ITERS: usize = 10;

struct TrackingAllocator;

static CURRENT_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn current_alloc_bytes() -> usize {
    CURRENT_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn peak_alloc_bytes() -> usize {
    PEAK_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn reset_peak_alloc_bytes() {
    PEAK_ALLOC_BYTES.store(current_alloc_bytes(), Ordering::Relaxed);
}

fn add_current_alloc_bytes(delta: usize) {
    let current = CURRENT_ALLOC_BYTES.fetch_add(delta, Ordering::Relaxed) + delta;
    PEAK_ALLOC_BYTES.fetch_max(current, Ordering::Relaxed);
}

fn sub_current_alloc_bytes(delta: usize) {
    let _ = CURRENT_ALLOC_BYTES.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(delta))
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        sub_current_alloc_bytes(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                add_current_alloc_bytes(new_size - layout.size());
            } else {
                sub_current_alloc_bytes(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

#[derive(Clone, Debug)]
struct CaseResult {
    fixture: String,
    case: String,
    min: u128,
    median: u128,
    p90: u128,
    max: u128,
    median_peak_heap_bytes: usize,
}

fn percentile<T: Copy>(sorted: &[T], percentile: f64) -> T {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

fn run_case<F>(fixture: &str, case: &str, mut op: F) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..WARMUP_ITERS {
        black_box(op());
    }

    let mut samples = Vec::with_capacity(MEASURE_ITERS);
    let mut mem_samples = Vec::with_capacity(MEASURE_ITERS);
    for _ in 0..MEASURE_ITERS {
        let baseline_alloc = current_alloc_bytes();
        reset_peak_alloc_bytes();
        let start = Instant::now();
        black_box(op());
        samples.push(start.elapsed().as_nanos());
        mem_samples.push(peak_alloc_bytes().saturating_sub(baseline_alloc));
    }

    samples.sort_unstable();
    mem_samples.sort_unstable();
    CaseResult {
        fixture: fixture.to_string(),
        case: case.to_string(),
        min: samples[0],
        median: percentile(&samples, 0.5),
        p90: percentile(&samples, 0.9),
        max: samples[samples.len() - 1],
        median_peak_heap_bytes: percentile(&mem_samples, 0.5),
    }
}

fn main() {
    println!("# mu-pager benchmark corpus");
    println!(
        "# warmup_iters={}, measure_iters={}",
        WARMUP_ITERS, MEASURE_ITERS
    );
    println!("fixture,case,bytes,min_ns,median_ns,p90_ns,max_ns,median_peak_heap_bytes");

    let settings = PageCalculationSettings::default();
    let options = SmartPageBreakOptions::default();

    for fixture in fixtures() {
        let html = fixture.html.as_str();
        let analysis = ContentAnalyzer::new(options.clone()).analyze_content(html);
        let mut results = Vec::new();

        results.push(run_case(fixture.key, "analyze/structure", || {
            let analysis = ContentAnalyzer::new(options.clone()).analyze_content(html);
            analysis.break_points.len()
        }));

        results.push(run_case(fixture.key, "analyze/density", || {
            let density = ContentDensityAnalyzer::new().calculate_content_density(html);
            density.word_count
        }));

        results.push(run_case(fixture.key, "analyze/patterns", || {
            ContentDensityAnalyzer::new()
                .detect_content_patterns(html)
                .segments
                .len()
        }));

        results.push(run_case(fixture.key, "paginate/baseline", || {
            SmartPageBreaker::new(
                settings.clone(),
                options.clone(),
                Some(PageBreakOptimizationOptions::disabled()),
            )
            .generate_optimal_pages(html, &analysis, 0, 0)
            .pages
            .len()
        }));

        results.push(run_case(fixture.key, "paginate/optimized", || {
            SmartPageBreaker::new(settings.clone(), options.clone(), None)
                .generate_optimal_pages(html, &analysis, 0, 0)
                .pages
                .len()
        }));

        let chapter = ChapterContent::new(fixture.key, fixture.html.clone());
        results.push(run_case(fixture.key, "controller/cold", || {
            let controller = PaginationController::new(ControllerOptions::default());
            controller
                .calculate_now(&chapter, 0, &settings, ViewportDimensions::REFERENCE)
                .page_count()
        }));

        let warm = PaginationController::new(ControllerOptions::default());
        warm.calculate_now(&chapter, 0, &settings, ViewportDimensions::REFERENCE);
        results.push(run_case(fixture.key, "controller/cached", || {
            warm.calculate_now(&chapter, 0, &settings, ViewportDimensions::REFERENCE)
                .page_count()
        }));

        for result in &results {
            println!(
                "{},{},{},{},{},{},{},{}",
                result.fixture,
                result.case,
                html.len(),
                result.min,
                result.median,
                result.p90,
                result.max,
                result.median_peak_heap_bytes
            );
        }
    }
}
