use std::env;
use std::fs;
use std::process::ExitCode;

use mu_pager::density::{ContentDensityAnalyzer, ContentDensityMetrics, ContentPatterns};
use mu_pager::model::{ContentAnalysis, PageBreakIssue, PageBreakPoint, PageInfo, SemanticElement};
use mu_pager::settings::{
    PageBreakOptimizationOptions, PageCalculationSettings, SmartPageBreakOptions,
};
use mu_pager::{ContentAnalyzer, SmartPageBreaker};

#[derive(Clone, Debug)]
enum Json {
    Null,
    Bool(bool),
    Num(usize),
    Float(f32),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_into(&mut out, pretty, 0);
        out
    }

    fn write_into(&self, out: &mut String, pretty: bool, depth: usize) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Float(v) if v.is_finite() => {
                out.push_str(&((*v * 100.0).round() / 100.0).to_string());
            }
            Json::Float(_) => out.push_str("null"),
            Json::Str(v) => write_json_string(out, v),
            Json::Arr(items) => {
                let entries = items.iter().map(|item| (None, item));
                write_container(out, ('[', ']'), entries, items.len(), pretty, depth);
            }
            Json::Obj(fields) => {
                let entries = fields.iter().map(|(key, value)| (Some(key.as_str()), value));
                write_container(out, ('{', '}'), entries, fields.len(), pretty, depth);
            }
        }
    }
}

fn write_container<'a>(
    out: &mut String,
    (open, close): (char, char),
    entries: impl Iterator<Item = (Option<&'a str>, &'a Json)>,
    len: usize,
    pretty: bool,
    depth: usize,
) {
    out.push(open);
    for (idx, (key, value)) in entries.enumerate() {
        if pretty {
            out.push('\n');
            out.push_str(&"  ".repeat(depth + 1));
        }
        if let Some(key) = key {
            write_json_string(out, key);
            out.push_str(if pretty { ": " } else { ":" });
        }
        value.write_into(out, pretty, depth + 1);
        if idx + 1 != len {
            out.push(',');
        }
    }
    if pretty && len > 0 {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push(close);
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(());
    }

    let cmd = rest.remove(0);
    match cmd.as_str() {
        "analyze" => {
            let path = first_arg(&rest, "analyze requires <chapter_path>")?;
            let html = read_chapter(&path)?;
            let analysis = ContentAnalyzer::default().analyze_content(&html);
            let mut output = vec![("chapter".to_string(), Json::Str(path))];
            output.extend(analysis_fields(&analysis));
            println!("{}", Json::Obj(output).render(pretty));
        }
        "density" => {
            let path = first_arg(&rest, "density requires <chapter_path>")?;
            let html = read_chapter(&path)?;
            let analyzer = ContentDensityAnalyzer::new();
            let density = analyzer.calculate_content_density(&html);
            let flow =
                analyzer.optimize_for_reading_flow(&density, &PageCalculationSettings::default());
            let output = Json::Obj(vec![
                ("chapter".to_string(), Json::Str(path)),
                ("density".to_string(), density_json(&density)),
                (
                    "reading_flow".to_string(),
                    Json::Obj(vec![
                        (
                            "recommended_font_size".to_string(),
                            Json::Float(flow.recommended_font_size),
                        ),
                        (
                            "recommended_line_height".to_string(),
                            Json::Float(flow.recommended_line_height),
                        ),
                        (
                            "recommended_words_per_page".to_string(),
                            Json::Num(flow.recommended_words_per_page),
                        ),
                        ("break_frequency".to_string(), Json::Float(flow.break_frequency)),
                        (
                            "focus_mode_recommended".to_string(),
                            Json::Bool(flow.focus_mode_recommended),
                        ),
                        (
                            "pauses".to_string(),
                            Json::Arr(
                                flow.pause_recommendations
                                    .iter()
                                    .map(|p| {
                                        Json::Obj(vec![
                                            (
                                                "reason".to_string(),
                                                Json::Str(format!("{:?}", p.reason)),
                                            ),
                                            ("every_words".to_string(), Json::Num(p.every_words)),
                                            (
                                                "duration_seconds".to_string(),
                                                Json::Num(p.duration_seconds as usize),
                                            ),
                                        ])
                                    })
                                    .collect(),
                            ),
                        ),
                    ]),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        "patterns" => {
            let path = first_arg(&rest, "patterns requires <chapter_path>")?;
            let html = read_chapter(&path)?;
            let patterns = ContentDensityAnalyzer::new().detect_content_patterns(&html);
            let output = Json::Obj(vec![
                ("chapter".to_string(), Json::Str(path)),
                ("patterns".to_string(), patterns_json(&patterns)),
            ]);
            println!("{}", output.render(pretty));
        }
        "readability" => {
            let path = first_arg(&rest, "readability requires <chapter_path>")?;
            let html = read_chapter(&path)?;
            let report = ContentDensityAnalyzer::new().assess_readability_factors(&html);
            let output = Json::Obj(vec![
                ("chapter".to_string(), Json::Str(path)),
                (
                    "flesch_reading_ease".to_string(),
                    Json::Float(report.flesch_reading_ease),
                ),
                (
                    "flesch_kincaid_grade".to_string(),
                    Json::Float(report.flesch_kincaid_grade),
                ),
                (
                    "passive_voice_ratio".to_string(),
                    Json::Float(report.passive_voice_ratio),
                ),
                (
                    "reading_time_minutes".to_string(),
                    Json::Num(report.reading_time_minutes as usize),
                ),
                (
                    "difficulty_factors".to_string(),
                    Json::Arr(
                        report
                            .difficulty_factors
                            .iter()
                            .map(|f| {
                                Json::Obj(vec![
                                    ("kind".to_string(), Json::Str(format!("{:?}", f.kind))),
                                    (
                                        "description".to_string(),
                                        Json::Str(f.description.to_string()),
                                    ),
                                    ("value".to_string(), Json::Float(f.value)),
                                ])
                            })
                            .collect(),
                    ),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        "paginate" => {
            let no_optimize = pop_flag(&mut rest, "--no-optimize");
            let opts = parse_paginate_args(rest)?;
            let html = read_chapter(&opts.path)?;
            let optimization = if no_optimize {
                PageBreakOptimizationOptions::disabled()
            } else {
                PageBreakOptimizationOptions::default()
            };
            let analyzer = ContentAnalyzer::new(opts.break_options.clone());
            let analysis = analyzer.analyze_content(&html);
            let breaker =
                SmartPageBreaker::new(opts.settings, opts.break_options, Some(optimization));
            let target = breaker.target_words_per_page(&analysis);
            let result = breaker.generate_optimal_pages(&html, &analysis, 0, 0);
            let output = Json::Obj(vec![
                ("chapter".to_string(), Json::Str(opts.path)),
                ("target_words_per_page".to_string(), Json::Num(target)),
                ("page_count".to_string(), Json::Num(result.pages.len())),
                (
                    "average_quality".to_string(),
                    Json::Float(result.average_quality_score),
                ),
                ("iterations".to_string(), Json::Num(result.iterations as usize)),
                (
                    "pages".to_string(),
                    Json::Arr(result.pages.iter().map(page_json).collect()),
                ),
                (
                    "issues".to_string(),
                    Json::Arr(result.problematic_breaks.iter().map(issue_json).collect()),
                ),
                (
                    "suggestions".to_string(),
                    Json::Arr(
                        result
                            .optimization_suggestions
                            .iter()
                            .cloned()
                            .map(Json::Str)
                            .collect(),
                    ),
                ),
            ]);
            println!("{}", output.render(pretty));
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `mu-pager --help` for usage",
                cmd
            ));
        }
    }

    Ok(())
}

#[derive(Clone, Debug)]
struct PaginateArgs {
    path: String,
    settings: PageCalculationSettings,
    break_options: SmartPageBreakOptions,
}

fn parse_paginate_args(args: Vec<String>) -> Result<PaginateArgs, String> {
    let mut path = None;
    let mut settings = PageCalculationSettings::default();
    let mut break_options = SmartPageBreakOptions::default();
    let (mut min, mut max) = (
        break_options.minimum_words_per_page,
        break_options.maximum_words_per_page,
    );
    let (mut width, mut height) = (settings.viewport.width, settings.viewport.height);
    let (mut font_size, mut line_height) = (settings.font_size, settings.line_height);

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let needs_value = matches!(
            flag,
            "--min" | "--max" | "--width" | "--height" | "--font-size" | "--line-height"
        );
        if !needs_value {
            if path.is_none() && !flag.starts_with("--") {
                path = Some(args[idx].clone());
                idx += 1;
                continue;
            }
            return Err(format!("unexpected argument '{}'", flag));
        }
        let value = args
            .get(idx + 1)
            .ok_or_else(|| format!("{} requires a value", flag))?;
        match flag {
            "--min" => min = parse_value(flag, value)?,
            "--max" => max = parse_value(flag, value)?,
            "--width" => width = parse_value(flag, value)?,
            "--height" => height = parse_value(flag, value)?,
            "--font-size" => font_size = parse_value(flag, value)?,
            _ => line_height = parse_value(flag, value)?,
        }
        idx += 2;
    }

    break_options = break_options.with_word_range(min, max);
    settings = PageCalculationSettings::for_viewport(width, height)
        .with_typography(font_size, line_height);
    Ok(PaginateArgs {
        path: path.ok_or_else(|| "paginate requires <chapter_path>".to_string())?,
        settings,
        break_options,
    })
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value '{}' for {}", value, flag))
}

fn read_chapter(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn analysis_fields(analysis: &ContentAnalysis) -> Vec<(String, Json)> {
    let m = &analysis.content_metrics;
    vec![
        (
            "readability_score".to_string(),
            Json::Num(analysis.readability_score as usize),
        ),
        (
            "metrics".to_string(),
            Json::Obj(vec![
                ("word_count".to_string(), Json::Num(m.word_count)),
                ("sentence_count".to_string(), Json::Num(m.sentence_count)),
                ("paragraph_count".to_string(), Json::Num(m.paragraph_count)),
                (
                    "average_words_per_sentence".to_string(),
                    Json::Float(m.average_words_per_sentence),
                ),
                ("complexity_score".to_string(), Json::Num(m.complexity_score as usize)),
                (
                    "estimated_reading_time".to_string(),
                    Json::Num(m.estimated_reading_time as usize),
                ),
                ("image_count".to_string(), Json::Num(m.image_count)),
                ("table_count".to_string(), Json::Num(m.table_count)),
                ("heading_count".to_string(), Json::Num(m.heading_count)),
                ("density".to_string(), Json::Str(m.density.as_str().to_string())),
            ]),
        ),
        (
            "elements".to_string(),
            Json::Arr(analysis.semantic_elements.iter().map(element_json).collect()),
        ),
        (
            "break_points".to_string(),
            Json::Arr(analysis.break_points.iter().map(break_point_json).collect()),
        ),
    ]
}

fn element_json(el: &SemanticElement) -> Json {
    Json::Obj(vec![
        ("type".to_string(), Json::Str(el.element_type.as_str().to_string())),
        ("tag".to_string(), Json::Str(el.tag.clone())),
        (
            "level".to_string(),
            el.level.map_or(Json::Null, |l| Json::Num(l as usize)),
        ),
        ("offset".to_string(), Json::Num(el.offset)),
        ("length".to_string(), Json::Num(el.length)),
        ("importance".to_string(), Json::Num(el.importance as usize)),
        ("can_break_before".to_string(), Json::Bool(el.can_break_before)),
        ("can_break_after".to_string(), Json::Bool(el.can_break_after)),
    ])
}

fn break_point_json(bp: &PageBreakPoint) -> Json {
    Json::Obj(vec![
        ("id".to_string(), Json::Str(bp.id.clone())),
        ("type".to_string(), Json::Str(bp.break_type.as_str().to_string())),
        ("offset".to_string(), Json::Num(bp.offset)),
        ("priority".to_string(), Json::Num(bp.priority as usize)),
        ("context".to_string(), Json::Str(bp.semantic_context.clone())),
    ])
}

fn page_json(page: &PageInfo) -> Json {
    Json::Obj(vec![
        ("page".to_string(), Json::Num(page.page_number)),
        ("global_page".to_string(), Json::Num(page.global_page_number)),
        ("start".to_string(), Json::Num(page.start_offset)),
        ("end".to_string(), Json::Num(page.end_offset)),
        ("words".to_string(), Json::Num(page.word_count)),
        ("read_minutes".to_string(), Json::Num(page.estimated_read_time as usize)),
        ("images".to_string(), Json::Bool(page.has_images)),
        ("tables".to_string(), Json::Bool(page.has_tables)),
        (
            "density".to_string(),
            Json::Str(page.content_density.as_str().to_string()),
        ),
        ("quality".to_string(), Json::Num(page.break_quality as usize)),
    ])
}

fn issue_json(issue: &PageBreakIssue) -> Json {
    Json::Obj(vec![
        ("kind".to_string(), Json::Str(issue.kind.as_str().to_string())),
        ("page".to_string(), Json::Num(issue.page_number)),
        ("offset".to_string(), Json::Num(issue.offset)),
        ("severity".to_string(), Json::Str(issue.severity.as_str().to_string())),
        ("description".to_string(), Json::Str(issue.description.clone())),
    ])
}

fn density_json(d: &ContentDensityMetrics) -> Json {
    Json::Obj(vec![
        ("word_count".to_string(), Json::Num(d.word_count)),
        ("sentence_count".to_string(), Json::Num(d.sentence_count)),
        ("paragraph_count".to_string(), Json::Num(d.paragraph_count)),
        (
            "average_words_per_sentence".to_string(),
            Json::Float(d.average_words_per_sentence),
        ),
        ("visual_element_count".to_string(), Json::Num(d.visual_element_count)),
        (
            "complexity".to_string(),
            Json::Str(format!("{:?}", d.complexity).to_lowercase()),
        ),
        (
            "technical_content_ratio".to_string(),
            Json::Float(d.technical_content_ratio),
        ),
        ("dialogue_ratio".to_string(), Json::Float(d.dialogue_ratio)),
        ("narrative_flow".to_string(), Json::Float(d.narrative_flow)),
        ("reading_velocity".to_string(), Json::Float(d.reading_velocity)),
        ("cognitive_load".to_string(), Json::Float(d.cognitive_load)),
    ])
}

fn patterns_json(p: &ContentPatterns) -> Json {
    Json::Obj(vec![
        (
            "segments".to_string(),
            Json::Arr(
                p.segments
                    .iter()
                    .map(|s| {
                        Json::Obj(vec![
                            ("paragraph".to_string(), Json::Num(s.paragraph_index)),
                            ("kind".to_string(), Json::Str(s.kind.as_str().to_string())),
                            ("words".to_string(), Json::Num(s.word_count)),
                        ])
                    })
                    .collect(),
            ),
        ),
        (
            "transitions".to_string(),
            Json::Arr(
                p.transitions
                    .iter()
                    .map(|t| {
                        Json::Obj(vec![
                            ("paragraph".to_string(), Json::Num(t.paragraph_index)),
                            ("from".to_string(), Json::Str(t.from.as_str().to_string())),
                            ("to".to_string(), Json::Str(t.to.as_str().to_string())),
                            ("abruptness".to_string(), Json::Float(t.abruptness)),
                        ])
                    })
                    .collect(),
            ),
        ),
        (
            "intensity".to_string(),
            Json::Arr(
                p.intensity_map
                    .iter()
                    .map(|&i| Json::Num(i as usize))
                    .collect(),
            ),
        ),
    ])
}

fn print_help() {
    let help = r#"mu-pager - inspect how chapter markup paginates

USAGE:
  mu-pager [--pretty] <command> [args...]

COMMANDS:
  analyze <chapter_path>
  density <chapter_path>
  patterns <chapter_path>
  readability <chapter_path>
  paginate <chapter_path> [--min <words>] [--max <words>]
           [--width <px>] [--height <px>] [--font-size <px>]
           [--line-height <n>] [--no-optimize]

NOTES:
  - Output is JSON.
  - Chapter paths point at XHTML or HTML files.
  - Page offsets are byte offsets into the chapter file.
"#;
    println!("{}", help);
}
