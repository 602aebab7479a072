//! Integration tests for the complete chart analysis pipeline
//!
//! Pages are drawn with OpenCV: a donut chart made of filled sectors with a
//! white hole, and either a legend (color square + label per row) or
//! `label NN %` captions around the chart. OCR is replaced by a scripted
//! recognizer that answers from the position of the requested block.

use opencv::{
    core::{Mat, Point, Rect, Scalar, Size, CV_8UC3},
    imgproc::{self, FILLED, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};
use scan_piecharts::{
    ArithmeticAmbiguity, ChartAnalysis, ChartError, ExtractionState, Label, NoText, OcrRequest, PiechartAnalyzer,
    ProfileStore, RecognitionMode, Result, Strategy,
};
use std::sync::{atomic::AtomicUsize, atomic::Ordering, Arc};

const LEGEND_PAGE_WIDTH: i32 = 900;
const CAPTION_PAGE_WIDTH: i32 = 800;
const PAGE_HEIGHT: i32 = 500;
const RADIUS: i32 = 150;
const HOLE_RADIUS: i32 = 90;

const LEGEND_X: i32 = 620;
const LEGEND_TOP: i32 = 100;
const LEGEND_PITCH: i32 = 40;

// BGR
const USE: [f64; 3] = [214.0, 150.0, 0.0];
const MANUFACTURING: [f64; 3] = [0.0, 120.0, 240.0];
const TRANSPORT: [f64; 3] = [60.0, 180.0, 60.0];
const END_OF_LIFE: [f64; 3] = [160.0, 60.0, 160.0];

fn scalar(bgr: [f64; 3]) -> Scalar {
    Scalar::new(bgr[0], bgr[1], bgr[2], 0.0)
}

fn blank_page(width: i32) -> Mat {
    Mat::new_rows_cols_with_default(PAGE_HEIGHT, width, CV_8UC3, Scalar::all(255.0)).unwrap()
}

/// Donut chart centered at `center`, one sector per `(percent, color)`
fn draw_donut(page: &mut Mat, center: Point, slices: &[(f64, [f64; 3])]) {
    let mut start = 0.0;
    for &(percent, bgr) in slices {
        let end = start + 360.0 * percent / 100.0;
        imgproc::ellipse(
            page,
            center,
            Size::new(RADIUS, RADIUS),
            0.0,
            start,
            end,
            scalar(bgr),
            FILLED,
            LINE_8,
            0,
        )
        .unwrap();
        start = end;
    }
    imgproc::circle(page, center, HOLE_RADIUS, Scalar::all(255.0), FILLED, LINE_8, 0).unwrap();
}

fn draw_text(page: &mut Mat, text: &str, origin: Point) {
    imgproc::put_text(
        page,
        text,
        origin,
        FONT_HERSHEY_SIMPLEX,
        0.5,
        Scalar::all(0.0),
        1,
        LINE_8,
        false,
    )
    .unwrap();
}

/// Legend to the right of the chart: a 16 px square then the label
fn draw_legend(page: &mut Mat, rows: &[(&str, [f64; 3])]) {
    for (i, (word, bgr)) in rows.iter().enumerate() {
        let top = LEGEND_TOP + LEGEND_PITCH * i as i32;
        imgproc::rectangle(page, Rect::new(LEGEND_X, top, 16, 16), scalar(*bgr), FILLED, LINE_8, 0).unwrap();
        draw_text(page, word, Point::new(LEGEND_X + 24, top + 14));
    }
}

fn legend_page(slices: &[(f64, [f64; 3])], legend: &[(&str, [f64; 3])]) -> Mat {
    let mut page = blank_page(LEGEND_PAGE_WIDTH);
    draw_donut(&mut page, Point::new(450, PAGE_HEIGHT / 2), slices);
    draw_legend(&mut page, legend);
    page
}

/// Chart in colors no legend or palette knows, with printed percentages
fn caption_page() -> Mat {
    let mut page = blank_page(CAPTION_PAGE_WIDTH);
    draw_donut(
        &mut page,
        Point::new(400, PAGE_HEIGHT / 2),
        &[
            (70.0, [40.0, 40.0, 200.0]),
            (20.0, [40.0, 200.0, 40.0]),
            (8.0, [200.0, 40.0, 200.0]),
            (2.0, [0.0, 200.0, 200.0]),
        ],
    );
    draw_text(&mut page, "Use 70%", Point::new(140, 120));
    draw_text(&mut page, "Prod 20%", Point::new(570, 120));
    draw_text(&mut page, "Transp 8%", Point::new(140, 390));
    draw_text(&mut page, "EoL 2%", Point::new(570, 390));
    page
}

/// Recognizer reading legend rows on legend pages by their vertical
/// position, and percentage blocks in call order
fn scripted_reader(
    legend_rows: &'static [&'static str],
    captions: &'static [&'static str],
) -> impl Fn(&OcrRequest<'_>) -> Result<String> + Send + Sync {
    let calls = AtomicUsize::new(0);
    move |request: &OcrRequest<'_>| -> Result<String> {
        match request.mode {
            RecognitionMode::Block => {
                if request.image.cols() != LEGEND_PAGE_WIDTH {
                    return Ok(String::new());
                }
                let center = request.region.y + request.region.height / 2;
                let row = ((center - LEGEND_TOP) as f64 / LEGEND_PITCH as f64).round().max(0.0) as usize;
                Ok(legend_rows.get(row).copied().unwrap_or_default().to_string())
            }
            RecognitionMode::BlockLstm => {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                Ok(captions.get(call).copied().unwrap_or_default().to_string())
            }
        }
    }
}

const LEGEND_ROWS: &[&str] = &["Use", "Manufacturing", "Transport", "End of life"];
const CAPTIONS: &[&str] = &["Use 70%", "Manufacturing 20%", "Transport 8%", "End of life 2%"];

fn analyzer<R: scan_piecharts::TextRecognizer>(recognizer: R) -> PiechartAnalyzer<R> {
    PiechartAnalyzer::new(Arc::new(ProfileStore::embedded().unwrap()), recognizer)
}

fn lifecycle_page() -> Mat {
    legend_page(
        &[(40.0, USE), (35.0, MANUFACTURING), (15.0, TRANSPORT), (10.0, END_OF_LIFE)],
        &[
            ("Use", USE),
            ("Manufacturing", MANUFACTURING),
            ("Transport", TRANSPORT),
            ("End of life", END_OF_LIFE),
        ],
    )
}

fn assert_close(actual: Option<f64>, expected: f64, tolerance: f64) {
    let actual = actual.expect("share missing");
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

// ============================================================================
// Outcomes that are not errors
// ============================================================================

#[test]
fn test_blank_page_has_no_chart() {
    let analyzer = analyzer(NoText);
    let analysis = analyzer.analyze(&blank_page(600), "HP").unwrap();
    assert_eq!(analysis, ChartAnalysis::NoChart);
    assert!(analysis.result().is_none());
}

#[test]
fn test_unknown_profile_is_a_configuration_error() {
    let analyzer = analyzer(NoText);
    let err = analyzer.analyze(&lifecycle_page(), "ACME").unwrap_err();
    assert!(matches!(err, ChartError::ProfileNotFound { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn test_empty_image_is_rejected() {
    let analyzer = analyzer(NoText);
    assert!(analyzer.analyze(&Mat::default(), "HP").is_err());
}

// ============================================================================
// Color path
// ============================================================================

#[test]
fn test_recovers_known_proportions_from_colors() {
    let analyzer = analyzer(scripted_reader(LEGEND_ROWS, &[]));
    let result = analyzer
        .analyze(&lifecycle_page(), "HP")
        .unwrap()
        .into_result()
        .expect("chart expected");

    assert_eq!(result.strategy, Strategy::ColorLegend);
    assert_eq!(result.state, ExtractionState::Accepted);
    assert_close(result.share(Label::Use), 40.0, 1.0);
    assert_close(result.share(Label::Manufacturing), 35.0, 1.0);
    assert_close(result.share(Label::Transport), 15.0, 1.0);
    assert_close(result.share(Label::EndOfLife), 10.0, 1.0);
    assert!((result.core_sum() - 100.0).abs() <= 0.5, "core sum {}", result.core_sum());
    assert!(result.confidence2 > 0.95);
    assert!(result.extrapolated.is_empty());
    assert!(!result.is_low_confidence());

    let ratios = result.ratios();
    assert_close(ratios.gwp_use_ratio, 0.4, 0.01);
    assert_close(ratios.gwp_eol_ratio, 0.1, 0.01);
}

#[test]
fn test_label_missing_from_legend_is_extrapolated() {
    let page = legend_page(
        &[(40.0, USE), (35.0, MANUFACTURING), (15.0, TRANSPORT), (10.0, END_OF_LIFE)],
        &[
            ("Use", USE),
            ("Manufacturing", MANUFACTURING),
            ("Shipping", TRANSPORT),
            ("End of life", END_OF_LIFE),
        ],
    );
    // "Shipping" matches no HP legend pattern
    let analyzer = analyzer(scripted_reader(&["Use", "Manufacturing", "Shipping", "End of life"], &[]));
    let result = analyzer.analyze(&page, "HP").unwrap().into_result().expect("chart expected");

    assert_eq!(result.strategy, Strategy::ColorLegend);
    assert!(result.is_extrapolated(Label::Transport));
    assert_close(result.share(Label::Transport), 15.0, 1.0);
    assert_close(result.share(Label::Use), 40.0, 1.0);
    assert!((result.core_sum() - 100.0).abs() < 1e-6);
    assert!(result.confidence2 < 0.9);
}

#[test]
fn test_distant_color_is_unattributed_mass() {
    // a slice 40 levels away from the use color on one channel
    let near_use = [214.0, 150.0, 40.0];
    let page = legend_page(
        &[(40.0, USE), (10.0, near_use), (35.0, MANUFACTURING), (15.0, TRANSPORT)],
        &[("Use", USE), ("Manufacturing", MANUFACTURING), ("Transport", TRANSPORT)],
    );
    let analyzer = analyzer(scripted_reader(LEGEND_ROWS, &[]));
    let result = analyzer.analyze(&page, "HP").unwrap().into_result().expect("chart expected");

    assert_eq!(result.strategy, Strategy::ColorLegend);
    assert_close(result.share(Label::Use), 40.0, 1.0);
    assert!((result.confidence2 - 0.9).abs() < 0.02, "confidence2 {}", result.confidence2);
    // end-of-life has no legend entry: it is what the other phases leave
    assert!(result.is_extrapolated(Label::EndOfLife));
    assert_close(result.share(Label::EndOfLife), 10.0, 1.0);
    assert!(!result
        .ambiguities
        .iter()
        .any(|a| matches!(a, ArithmeticAmbiguity::CoreSum { .. })));
}

#[test]
fn test_end_of_life_missing_from_legend_is_extrapolated() {
    let page = legend_page(
        &[(40.0, USE), (35.0, MANUFACTURING), (15.0, TRANSPORT), (10.0, END_OF_LIFE)],
        &[
            ("Use", USE),
            ("Manufacturing", MANUFACTURING),
            ("Transport", TRANSPORT),
            ("Disposal", END_OF_LIFE),
        ],
    );
    // "Disposal" matches no HP legend pattern
    let analyzer = analyzer(scripted_reader(&["Use", "Manufacturing", "Transport", "Disposal"], &[]));
    let result = analyzer.analyze(&page, "HP").unwrap().into_result().expect("chart expected");

    assert_eq!(result.strategy, Strategy::ColorLegend);
    assert_eq!(result.state, ExtractionState::Accepted);
    assert!(result.is_extrapolated(Label::EndOfLife));
    assert!(!result.eol_placeholder);
    assert_close(result.share(Label::EndOfLife), 10.0, 1.0);
    assert_close(result.share(Label::Transport), 15.0, 1.0);
    assert!((result.core_sum() - 100.0).abs() < 1e-6);
    assert!(result.ambiguities.is_empty());
    assert!(!result.is_low_confidence());
}

// ============================================================================
// Direct OCR fallback
// ============================================================================

#[test]
fn test_falls_back_to_printed_percentages() {
    let analyzer = analyzer(scripted_reader(&[], CAPTIONS));
    let result = analyzer
        .analyze(&caption_page(), "HP")
        .unwrap()
        .into_result()
        .expect("chart expected");

    assert_eq!(result.strategy, Strategy::DirectOcr);
    assert_eq!(result.share(Label::Use), Some(70.0));
    assert_eq!(result.share(Label::Manufacturing), Some(20.0));
    assert_eq!(result.share(Label::Transport), Some(8.0));
    assert_eq!(result.share(Label::EndOfLife), Some(2.0));
    assert!((result.confidence1 - 1.0).abs() < 1e-9);
    assert_eq!(result.confidence2, 0.0);
    assert_eq!(result.state, ExtractionState::Accepted);
}

#[test]
fn test_low_confidence_reading_is_returned_as_such() {
    // the printed shares cover 80 %, under HP's minimum OCR confidence
    const PARTIAL: &[&str] = &["Use 60%", "Manufacturing 20%"];
    let result = analyzer(scripted_reader(&[], PARTIAL))
        .analyze(&caption_page(), "HP")
        .unwrap()
        .into_result()
        .expect("chart expected");

    assert_eq!(result.strategy, Strategy::DirectOcr);
    assert_eq!(result.state, ExtractionState::LowConfidence);
    assert!((result.confidence1 - 0.8).abs() < 1e-9);
    assert!(result.eol_placeholder);
    assert!(result.is_extrapolated(Label::Transport));
    assert!(result.is_low_confidence());

    // a document made of this page alone still keeps the reading
    let selected = analyzer(scripted_reader(&[], PARTIAL))
        .analyze_document([&caption_page()], Some("HP"))
        .unwrap()
        .expect("result expected");
    assert_eq!(selected.state, ExtractionState::LowConfidence);
}

#[test]
fn test_chart_without_any_reading_is_unreadable() {
    let analyzer = analyzer(NoText);
    let analysis = analyzer.analyze(&caption_page(), "HP").unwrap();
    assert!(matches!(analysis, ChartAnalysis::Unreadable { charts } if charts >= 1));
}

// ============================================================================
// Document-level selection
// ============================================================================

#[test]
fn test_document_prefers_later_color_result_over_ocr() {
    let ocr_page = caption_page();
    let color_page = lifecycle_page();
    let analyzer = analyzer(scripted_reader(LEGEND_ROWS, CAPTIONS));

    let selected = analyzer
        .analyze_document([&ocr_page, &color_page], Some("HP"))
        .unwrap()
        .expect("result expected");

    assert_eq!(selected.strategy, Strategy::ColorLegend);
    assert!(selected.confidence2 >= 0.5);
    assert_close(selected.share(Label::Use), 40.0, 1.0);
}

#[test]
fn test_document_keeps_ocr_result_when_nothing_better() {
    let ocr_page = caption_page();
    let blank = blank_page(600);
    let analyzer = analyzer(scripted_reader(&[], CAPTIONS));

    let selected = analyzer
        .analyze_document([&blank, &ocr_page], Some("HP"))
        .unwrap()
        .expect("result expected");
    assert_eq!(selected.strategy, Strategy::DirectOcr);
    assert_eq!(selected.share(Label::Use), Some(70.0));
}

#[test]
fn test_selector_settles_on_each_page_analysis() {
    let analyzer = analyzer(scripted_reader(LEGEND_ROWS, CAPTIONS));
    let mut selector = analyzer.selector(Some("HP")).unwrap();

    let ocr = analyzer.analyze(&caption_page(), "HP").unwrap().into_result().unwrap();
    assert_eq!(selector.offer(ocr), ExtractionState::LowConfidence);
    let color = analyzer.analyze(&lifecycle_page(), "HP").unwrap().into_result().unwrap();
    assert_eq!(selector.offer(color), ExtractionState::Accepted);

    let selected = selector.into_selected().expect("result expected");
    assert_eq!(selected.strategy, Strategy::ColorLegend);
    assert!(analyzer.selector(Some("ACME")).is_err());
}

#[test]
fn test_document_without_charts() {
    let analyzer = analyzer(NoText);
    let blank = blank_page(600);
    assert!(analyzer.analyze_document([&blank], Some("HP")).unwrap().is_none());
}
