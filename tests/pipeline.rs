use huelens::config::EngineSettings;
use huelens::geometry::{total_area, Rect};
use huelens::platform::fake::{FakeCapture, FakeDesktop, FakeDisplay, FakeWindow};
use huelens::platform::WindowId;
use huelens::OverlayEngine;

const SCREEN: Rect = Rect { left: 0, top: 0, right: 1920, bottom: 1080 };
const RED: [u8; 4] = [0, 0, 255, 255];
const GREY: [u8; 4] = [128, 128, 128, 255];
const XL: WindowId = WindowId(1);

type Engine = OverlayEngine<FakeDesktop, FakeCapture, FakeDisplay>;

fn engine_with(desktop: &FakeDesktop, settings: EngineSettings) -> (Engine, FakeDisplay) {
    let display = FakeDisplay::new(desktop.bounds());
    let engine = OverlayEngine::new(
        desktop.clone(),
        FakeCapture::new(desktop.clone()),
        display.clone(),
        &settings,
        210,
    );
    (engine, display)
}

fn setup(windows: Vec<FakeWindow>) -> (FakeDesktop, Engine, FakeDisplay) {
    let desktop = FakeDesktop::new(SCREEN);
    for window in windows {
        desktop.add_window(window);
    }
    let (engine, display) = engine_with(&desktop, EngineSettings::default());
    (desktop, engine, display)
}

fn workbook(rect: Rect) -> FakeWindow {
    FakeWindow::new(XL.0, "XLMAIN", rect).with_color(RED)
}

#[test]
fn test_overlay_is_excluded_from_capture_at_startup() {
    let (_desktop, _engine, display) = setup(vec![]);
    assert!(display.is_excluded_from_capture());
}

#[test]
fn test_steady_window_draws_once() {
    let (_desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);

    let first = engine.tick();
    assert_eq!(first.tracked, 1);
    assert_eq!(first.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert!(first.clears.is_empty());
    assert_eq!(first.dirty, Some(Rect::new(0, 0, 800, 600)));
    assert_eq!(display.published(), vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.lock_attempts(), 1);

    let second = engine.tick();
    assert!(!second.wrote_pixels());
    assert!(!second.lock_taken);
    assert_eq!(second.dirty, None);
    assert_eq!(display.lock_attempts(), 1);
    assert_eq!(display.published().len(), 1);
}

#[test]
fn test_moved_window_clears_old_rect_and_draws_new() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    desktop.set_rect(XL, Rect::new(100, 100, 900, 700));
    let report = engine.tick();

    assert_eq!(report.clears, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(report.draws, vec![Rect::new(100, 100, 900, 700)]);
    assert!(report.zorder_refreshed);
    assert_eq!(report.dirty, Some(Rect::new(0, 0, 900, 700)));

    assert_eq!(display.pixel_at(50, 50), Some([0, 0, 0, 0]));
    assert_eq!(display.pixel_at(850, 650).map(|px| px[3]), Some(255));
}

#[test]
fn test_occluded_window_draws_only_visible_area() {
    let popup = FakeWindow::new(2, "Popup", Rect::new(0, 0, 400, 300)).with_color(GREY);
    let (_desktop, mut engine, display) = setup(vec![popup, workbook(Rect::new(0, 0, 800, 600))]);

    let report = engine.tick();

    assert!((2..=3).contains(&report.draws.len()), "{:?}", report.draws);
    assert_eq!(total_area(&report.draws), 800 * 600 - 400 * 300);
    assert!(report.draws.iter().all(|r| !r.intersects(&Rect::new(0, 0, 400, 300))));

    assert_eq!(display.pixel_at(100, 100), Some([0, 0, 0, 0]));
    assert_eq!(display.pixel_at(600, 100).map(|px| px[3]), Some(255));
    assert_eq!(display.pixel_at(100, 500).map(|px| px[3]), Some(255));
}

#[test]
fn test_occluder_moving_away_redraws_uncovered_area() {
    let popup = FakeWindow::new(2, "Popup", Rect::new(0, 0, 400, 300)).with_color(GREY);
    let (desktop, mut engine, display) = setup(vec![popup, workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    desktop.set_rect(WindowId(2), Rect::new(1000, 700, 1400, 1000));
    desktop.set_foreground(Some(WindowId(2)));
    let report = engine.tick();

    assert!(report.zorder_refreshed);
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.pixel_at(100, 100).map(|px| px[3]), Some(255));
}

#[test]
fn test_ignored_process_does_not_occlude() {
    let snip = FakeWindow::new(2, "Microsoft-Windows-SnipperToolbar", Rect::new(0, 0, 400, 300))
        .with_process(77, "SnippingTool.exe")
        .with_color(GREY);
    let (_desktop, mut engine, _display) = setup(vec![snip, workbook(Rect::new(0, 0, 800, 600))]);

    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
    // The snipping window and the workbook itself, once each.
    assert_eq!(engine.process_lookups(), 2);

    engine.tick();
    assert_eq!(engine.process_lookups(), 2);
}

#[test]
fn test_hidden_window_is_cleared_kept_and_redrawn_on_restore() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    desktop.set_minimized(XL, true);
    let hidden = engine.tick();
    assert_eq!(hidden.hidden, 1);
    assert_eq!(hidden.tracked, 0);
    assert_eq!(hidden.clears, vec![Rect::new(0, 0, 800, 600)]);
    assert!(hidden.draws.is_empty());
    assert_eq!(engine.tracked_count(), 1);
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));

    let still_hidden = engine.tick();
    assert!(!still_hidden.wrote_pixels());

    desktop.set_minimized(XL, false);
    let restored = engine.tick();
    assert_eq!(restored.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.pixel_at(10, 10).map(|px| px[3]), Some(255));
}

#[test]
fn test_destroyed_window_drops_cache_and_clears_pixels() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();
    assert_eq!(engine.caches().len(), 1);

    desktop.destroy(XL);
    let report = engine.tick();

    assert_eq!(report.removed, 1);
    assert_eq!(report.clears, vec![Rect::new(0, 0, 800, 600)]);
    assert!(engine.caches().is_empty());
    assert_eq!(engine.tracked_count(), 0);
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));

    assert!(!engine.tick().wrote_pixels());
}

#[test]
fn test_destroyed_window_clear_survives_a_failed_lock() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    desktop.destroy(XL);
    display.set_fail_lock(true);
    assert!(engine.tick().aborted);

    display.set_fail_lock(false);
    let report = engine.tick();
    assert!(!report.aborted);
    assert!(report.clears.contains(&Rect::new(0, 0, 800, 600)));
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));
}

#[test]
fn test_lock_failure_aborts_and_next_tick_retries() {
    let (_desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    display.set_fail_lock(true);

    let failed = engine.tick();
    assert!(failed.aborted);
    assert!(!failed.lock_taken);
    assert!(display.published().is_empty());
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));

    display.set_fail_lock(false);
    let retried = engine.tick();
    assert!(!retried.aborted);
    assert_eq!(retried.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.pixel_at(10, 10).map(|px| px[3]), Some(255));
}

#[test]
fn test_content_change_triggers_redraw() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();
    assert_eq!(display.pixel_at(10, 10).map(|px| px[3]), Some(255));

    desktop.set_color(XL, GREY);
    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert!(report.clears.is_empty());
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));
}

#[test]
fn test_red_is_recolored_toward_target_hue() {
    let (_desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    let [b, g, r, a] = display.pixel_at(400, 300).unwrap();
    assert_eq!(a, 255);
    assert!(b > g && g > r, "expected an azure pixel, got {:?}", [b, g, r, a]);
}

#[test]
fn test_unmatched_colors_stay_transparent() {
    let window = FakeWindow::new(XL.0, "XLMAIN", Rect::new(0, 0, 200, 200)).with_color(GREY);
    let (_desktop, mut engine, display) = setup(vec![window]);

    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 200, 200)]);
    assert_eq!(display.pixel_at(100, 100), Some([0, 0, 0, 0]));
}

#[test]
fn test_hue_change_forces_redraw() {
    let (_desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();
    let before = display.pixel_at(10, 10);

    assert!(!engine.set_hue(210));
    assert!(engine.set_hue(120));
    assert_eq!(engine.target_hue(), 120);

    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_ne!(display.pixel_at(10, 10), before);
}

#[test]
fn test_capture_failure_skips_window_without_drawing() {
    let (_desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.capture_mut().set_fail_screen_copy(true);

    let report = engine.tick();
    assert_eq!(report.capture_failures, 1);
    assert!(report.draws.is_empty());
    assert_eq!(display.lock_attempts(), 0);

    engine.capture_mut().set_fail_screen_copy(false);
    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
}

#[test]
fn test_untracked_classes_are_ignored() {
    let other = FakeWindow::new(5, "Notepad", Rect::new(0, 0, 300, 300)).with_color(RED);
    let (_desktop, mut engine, display) = setup(vec![other]);

    let report = engine.tick();
    assert_eq!(report.tracked, 0);
    assert!(!report.wrote_pixels());
    assert_eq!(display.lock_attempts(), 0);
}

#[test]
fn test_title_filter_narrows_tracking() {
    let desktop = FakeDesktop::new(SCREEN);
    desktop.add_window(workbook(Rect::new(0, 0, 400, 400)).with_title("Budget.xlsx - Excel"));
    desktop.add_window(FakeWindow::new(2, "XLMAIN", Rect::new(500, 0, 900, 400)).with_title("Notes.xlsx - Excel"));
    let settings = EngineSettings {
        title_contains: Some("Budget".to_string()),
        ..EngineSettings::default()
    };
    let (mut engine, _display) = engine_with(&desktop, settings);

    let report = engine.tick();
    assert_eq!(report.tracked, 1);
    assert_eq!(report.draws, vec![Rect::new(0, 0, 400, 400)]);
}

#[test]
fn test_window_opened_later_is_picked_up_by_rescan() {
    let (desktop, mut engine, _display) = setup(vec![workbook(Rect::new(0, 0, 400, 400))]);
    engine.tick();

    desktop.add_window(FakeWindow::new(2, "XLMAIN", Rect::new(500, 0, 900, 400)).with_color(RED));
    let settings = EngineSettings::default();
    let mut found = None;
    for _ in 0..settings.rescan_interval {
        let report = engine.tick();
        if report.tracked == 2 {
            found = Some(report);
            break;
        }
    }

    let report = found.expect("second workbook was never tracked");
    assert_eq!(report.draws, vec![Rect::new(500, 0, 900, 400)]);
}

#[test]
fn test_window_with_unreadable_rect_redraws_when_it_returns() {
    let (desktop, mut engine, display) = setup(vec![workbook(Rect::new(0, 0, 800, 600))]);
    engine.tick();

    desktop.set_rect(XL, Rect::new(0, 0, 0, 0));
    let skipped = engine.tick();
    assert_eq!(skipped.tracked, 0);
    assert_eq!(skipped.clears, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(engine.tracked_count(), 1);
    assert_eq!(display.pixel_at(10, 10), Some([0, 0, 0, 0]));

    desktop.set_rect(XL, Rect::new(0, 0, 800, 600));
    let back = engine.tick();
    assert_eq!(back.tracked, 1);
    assert_eq!(back.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.pixel_at(10, 10).map(|px| px[3]), Some(255));

    assert!(!engine.tick().wrote_pixels());
}

#[test]
fn test_skipped_window_clear_forces_neighbour_redraw() {
    let front = FakeWindow::new(2, "XLMAIN", Rect::new(400, 0, 1200, 600)).with_color(RED);
    let (desktop, mut engine, display) = setup(vec![front, workbook(Rect::new(0, 0, 800, 600))]);
    let first = engine.tick();
    assert_eq!(first.tracked, 2);
    assert_eq!(display.pixel_at(600, 300).map(|px| px[3]), Some(255));

    desktop.set_rect(XL, Rect::new(0, 0, 0, 0));
    let skipped = engine.tick();
    assert_eq!(skipped.tracked, 1);
    assert_eq!(skipped.clears, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(skipped.draws, vec![Rect::new(400, 0, 1200, 600)]);
    assert_eq!(display.pixel_at(600, 300).map(|px| px[3]), Some(255));
    assert_eq!(display.pixel_at(100, 300), Some([0, 0, 0, 0]));

    desktop.set_rect(XL, Rect::new(0, 0, 800, 600));
    let back = engine.tick();
    assert!(back.clears.is_empty());
    assert_eq!(back.draws, vec![Rect::new(0, 0, 400, 600)]);
    assert_eq!(display.pixel_at(100, 300).map(|px| px[3]), Some(255));
}

#[test]
fn test_cloaked_occluder_does_not_hide_window() {
    let popup = FakeWindow::new(2, "ApplicationFrameWindow", Rect::new(0, 0, 400, 300)).with_color(GREY);
    let (desktop, mut engine, display) = setup(vec![popup, workbook(Rect::new(0, 0, 800, 600))]);
    desktop.set_cloaked(WindowId(2), true);

    let report = engine.tick();
    assert_eq!(report.draws, vec![Rect::new(0, 0, 800, 600)]);
    assert_eq!(display.pixel_at(100, 100).map(|px| px[3]), Some(255));
}
