//! Regression tests for awkward real-world chapter markup and the controller
//!
//! Run: cargo test --all-features --test regression

use std::sync::Arc;

use mu_pager::analyzer::analyze_content;
use mu_pager::breaker::SmartPageBreaker;
use mu_pager::controller::{ChapterContent, PaginationController};
use mu_pager::density::{ContentDensityAnalyzer, SegmentKind};
use mu_pager::model::{ElementType, PageBreakResult};
use mu_pager::settings::{
    ControllerOptions, PageBreakOptimizationOptions, PageCalculationSettings, SmartPageBreakOptions,
    ViewportDimensions,
};

fn paginate(html: &str) -> PageBreakResult {
    let analysis = analyze_content(html);
    SmartPageBreaker::new(
        PageCalculationSettings::default(),
        SmartPageBreakOptions::default(),
        None,
    )
    .generate_optimal_pages(html, &analysis, 0, 0)
}

fn assert_gapless(html: &str, result: &PageBreakResult) {
    assert_eq!(result.pages[0].start_offset, 0);
    for pair in result.pages.windows(2) {
        assert_eq!(pair[0].end_offset, pair[1].start_offset);
    }
    assert_eq!(result.pages.last().unwrap().end_offset, html.len());
}

fn prose(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| {
            format!(
                "<p>The {} morning came slowly over the hills and the river. {}She walked on.</p>",
                i,
                "Light settled across the quiet fields below. ".repeat(5)
            )
        })
        .collect()
}

// -- Markup tolerance ---------------------------------------------------------

#[test]
fn test_xhtml_document_wrapper() {
    let html = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Ch 1</title>\
         <style>p {{ margin: 0 }}</style></head><body>{}</body></html>",
        prose(12)
    );
    let analysis = analyze_content(&html);
    assert!(analysis
        .semantic_elements
        .iter()
        .all(|el| el.element_type == ElementType::Paragraph));
    assert_eq!(analysis.semantic_elements.len(), 12);
    let result = paginate(&html);
    assert!(result.pages.len() >= 2);
    assert_gapless(&html, &result);
}

#[test]
fn test_unclosed_and_mismatched_tags() {
    let html = format!(
        "<div><p>Opening words here.</div><p>{}</span></p><p>{}",
        "middle text ".repeat(150),
        "trailing text ".repeat(150)
    );
    let analysis = analyze_content(&html);
    assert!(analysis.content_metrics.word_count > 500);
    let result = paginate(&html);
    assert_gapless(&html, &result);
    let total: usize = result.pages.iter().map(|p| p.word_count).sum();
    assert_eq!(total, analysis.content_metrics.word_count);
}

#[test]
fn test_html_void_elements() {
    let html = format!(
        "<p>Before the break<br>and after it.</p><hr><p>{}</p><img src=\"a.png\" alt=\"A\"><p>{}</p>",
        "filler words ".repeat(150),
        "closing words ".repeat(150)
    );
    let result = paginate(&html);
    assert_gapless(&html, &result);
    assert!(result.pages.iter().any(|p| p.has_images));
}

fn long_chapter(opening: &str) -> String {
    let body: String = (0..40)
        .map(|i| format!("<p>Paragraph {} {}ends here.</p>\n", i, "text ".repeat(46)))
        .collect();
    format!("{}{}", opening, body)
}

#[test]
fn test_bare_ampersand_paginates_like_escaped_one() {
    let escaped = long_chapter("<p>Fish &amp; chips for tea.</p>");
    let bare = long_chapter("<p>Fish & chips for tea.</p>");
    let expected = paginate(&escaped);
    let result = paginate(&bare);
    assert!(result.pages.len() >= 5, "{}", result.pages.len());
    assert_gapless(&bare, &result);
    let counts = |r: &PageBreakResult| r.pages.iter().map(|p| p.word_count).collect::<Vec<_>>();
    assert_eq!(counts(&result), counts(&expected));
    let total: usize = result.pages.iter().map(|p| p.word_count).sum();
    assert_eq!(total, analyze_content(&bare).content_metrics.word_count);
    assert_eq!(total, 2004);
}

#[test]
fn test_stray_angle_bracket_keeps_later_pages() {
    let html = long_chapter("<p>Three < four, said the sign.</p>");
    let result = paginate(&html);
    assert!(result.pages.len() >= 5, "{}", result.pages.len());
    assert_gapless(&html, &result);
    let last = result.pages.last().unwrap();
    assert!(last.word_count > 0);
}

#[test]
fn test_entities_do_not_inflate_word_counts() {
    let html = "<p>Fish &amp; chips &mdash; a &#8220;classic&#8221;&nbsp;meal.</p>";
    let analysis = analyze_content(html);
    let result = paginate(html);
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].word_count, analysis.content_metrics.word_count);
    assert_eq!(result.pages[0].word_count, 5);
}

#[test]
fn test_multibyte_text_offsets_are_char_boundaries() {
    let html: String = (0..30)
        .map(|i| {
            format!(
                "<p>Überraschung {} — naïve café, 東京の夜は長い、そして静かだ。 {}</p>",
                i,
                "ß€ñ word ".repeat(12)
            )
        })
        .collect();
    let result = paginate(&html);
    assert!(result.pages.len() >= 2);
    assert_gapless(&html, &result);
    for page in &result.pages {
        assert!(html.is_char_boundary(page.start_offset));
        assert!(html.is_char_boundary(page.end_offset));
    }
    let analysis = analyze_content(&html);
    for bp in &analysis.break_points {
        assert!(html.is_char_boundary(bp.offset));
    }
}

#[test]
fn test_long_preformatted_block_stays_whole_when_it_can() {
    let code: String = (0..40).map(|i| format!("let value_{} = {};\n", i, i)).collect();
    let html = format!("{}<pre><code>{}</code></pre>{}", prose(3), code, prose(3));
    let result = paginate(&html);
    let start = html.find("<pre>").unwrap();
    let end = html.find("</pre>").unwrap() + "</pre>".len();
    assert_gapless(&html, &result);
    for page in &result.pages[1..] {
        assert!(page.start_offset <= start || page.start_offset >= end);
    }
}

#[test]
fn test_only_images() {
    let html = "<figure><img src=\"cover.jpg\" alt=\"\"/></figure><img src=\"map.png\"/>";
    let analysis = analyze_content(html);
    assert_eq!(analysis.content_metrics.image_count, 2);
    let result = paginate(html);
    assert!(result.pages.len() <= 1);
}

// -- Density on chapter-shaped content ----------------------------------------

#[test]
fn test_dialogue_chapter_classified() {
    let html = (0..6)
        .map(|i| format!("<p>\"Come along now, number {},\" she said quietly.</p>", i))
        .collect::<String>();
    let patterns = ContentDensityAnalyzer::new().detect_content_patterns(&html);
    assert_eq!(patterns.segments.len(), 6);
    assert!(patterns
        .segments
        .iter()
        .all(|s| s.kind == SegmentKind::Dialogue));
    assert!(patterns.transitions.is_empty());
}

// -- Controller ---------------------------------------------------------------

#[test]
fn test_book_numbering_across_chapters() {
    let controller = PaginationController::new(ControllerOptions::default());
    let settings = PageCalculationSettings::default();
    let dims = ViewportDimensions::new(1920.0, 1080.0);
    let book = [
        ChapterContent::new("One", prose(10)),
        ChapterContent::new("Two", prose(25)),
        ChapterContent::new("Three", prose(4)),
    ];

    let mut next_global = 0;
    for (idx, chapter) in book.iter().enumerate() {
        let map = controller.calculate_now(chapter, idx, &settings, dims);
        assert_eq!(map.chapter_index, idx);
        assert_eq!(map.pages[0].global_page_number, next_global);
        next_global += map.page_count();
    }
    assert_eq!(controller.global_page_offset(3), next_global);
}

#[test]
fn test_recomputed_chapter_shifts_later_numbers() {
    let controller = PaginationController::default();
    let settings = PageCalculationSettings::default();
    let dims = ViewportDimensions::REFERENCE;

    controller.calculate_now(&ChapterContent::new("One", prose(4)), 0, &settings, dims);
    let second = controller.calculate_now(&ChapterContent::new("Two", prose(10)), 1, &settings, dims);
    let before = second.pages[0].global_page_number;

    // chapter one grows after an edit
    let grown = controller.calculate_now(&ChapterContent::new("One", prose(30)), 0, &settings, dims);
    let shifted = controller.get_page_break_map(1).unwrap();
    assert_eq!(shifted.pages[0].global_page_number, grown.page_count());
    assert!(shifted.pages[0].global_page_number > before);
    assert_eq!(shifted.pages.len(), second.pages.len());
    // the earlier snapshot is untouched
    assert_eq!(second.pages[0].global_page_number, before);
}

#[test]
fn test_settings_change_misses_cache() {
    let controller = PaginationController::default();
    let chapter = ChapterContent::new("One", prose(20));
    let dims = ViewportDimensions::REFERENCE;
    let normal = controller.calculate_now(&chapter, 0, &PageCalculationSettings::default(), dims);
    let large = controller.calculate_now(
        &chapter,
        0,
        &PageCalculationSettings::default().with_typography(28.0, 1.8),
        dims,
    );
    assert!(!Arc::ptr_eq(&normal, &large));
    assert!(large.page_count() >= normal.page_count());
    let stats = controller.cache_stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
}

#[test]
fn test_disabled_optimization_controller() {
    let controller = PaginationController::default()
        .with_optimization(PageBreakOptimizationOptions::disabled())
        .with_break_options(SmartPageBreakOptions::compact());
    let map = controller.calculate_now(
        &ChapterContent::new("One", prose(20)),
        0,
        &PageCalculationSettings::for_viewport(390.0, 844.0),
        ViewportDimensions::new(390.0, 844.0),
    );
    for page in &map.pages[..map.pages.len() - 1] {
        assert!(page.word_count >= SmartPageBreakOptions::compact().minimum_words_per_page);
        assert!(page.word_count <= SmartPageBreakOptions::compact().maximum_words_per_page);
    }
}

#[cfg(feature = "async")]
mod debounced {
    use super::*;
    use mu_pager::error::PaginationError;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_slider_drag_yields_one_calculation() {
        let controller = PaginationController::default();
        let chapter = ChapterContent::new("One", prose(20));
        let dims = ViewportDimensions::REFERENCE;
        let request = |step: u64, size: f32| {
            let controller = &controller;
            let chapter = &chapter;
            async move {
                tokio::time::sleep(Duration::from_millis(50 * step)).await;
                let settings = PageCalculationSettings::default().with_typography(size, 1.6);
                controller
                    .calculate_page_breaks(chapter, 0, &settings, dims)
                    .await
            }
        };

        let started = tokio::time::Instant::now();
        let (a, b, c, d, e) = tokio::join!(
            request(0, 15.0),
            request(1, 16.0),
            request(2, 17.0),
            request(3, 18.0),
            request(4, 19.0),
        );
        for superseded in [a, b, c, d] {
            assert!(matches!(superseded, Err(PaginationError::Superseded { .. })));
        }
        let map = e.unwrap();
        assert_eq!(map.settings.font_size, 19.0);
        // last request at 200ms plus the quiet period
        assert!(started.elapsed() >= Duration::from_millis(500));
        let stats = controller.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(controller.get_page_break_map(0).unwrap().settings.font_size, 19.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_error_names_replacement() {
        let controller = PaginationController::default();
        let chapter = ChapterContent::new("One", prose(5));
        let dims = ViewportDimensions::REFERENCE;
        let first = PageCalculationSettings::default();
        let second = PageCalculationSettings::default().with_typography(20.0, 1.6);

        let (a, b) = tokio::join!(
            controller.calculate_page_breaks(&chapter, 0, &first, dims),
            async {
                tokio::time::sleep(Duration::from_millis(299)).await;
                controller.calculate_page_breaks(&chapter, 0, &second, dims).await
            }
        );
        let err = a.unwrap_err();
        assert_eq!(err.to_string(), "Pagination request 1 superseded by request 2");
        assert!(matches!(err, PaginationError::Superseded { .. }));
        assert_eq!(b.unwrap().settings.font_size, 20.0);
    }
}
