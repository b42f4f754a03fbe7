#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod overlay;

use anyhow::Result;
use huelens::config::{Config, EngineSettings, HueConfig};
use huelens::logger::LoggerOptions;
use huelens::{log_info, log_warn};
use std::path::PathBuf;

#[cfg(windows)]
use crossbeam_channel::{bounded, Receiver, Sender};
#[cfg(windows)]
use std::sync::Arc;
#[cfg(windows)]
use tray_icon::menu::{CheckMenuItem, Menu, MenuEvent, MenuItem};
#[cfg(windows)]
use tray_icon::{Icon, TrayIconBuilder};

struct Args {
    stream_logs: bool,
    verbose: bool,
    trace: bool,
    hue_file: Option<PathBuf>,
    settings: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .map(PathBuf::from)
        };

        Self {
            stream_logs: args.iter().any(|a| a == "--stream-logs"),
            verbose: args.iter().any(|a| a == "--verbose"),
            trace: args.iter().any(|a| a == "--trace"),
            hue_file: value_of("--hue-file"),
            settings: value_of("--settings"),
        }
    }
}

fn main() -> Result<()> {
    let result = run_app();
    let _ = huelens::logger::finalize_logs();
    result
}

fn run_app() -> Result<()> {
    let args = Args::parse();
    let config = Config::new()?;

    if args.trace {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    }

    let settings_path = args.settings.clone().unwrap_or_else(|| config.settings_path.clone());
    let settings_result = if args.settings.is_some() || settings_path.exists() {
        Some(EngineSettings::load(&settings_path))
    } else {
        None
    };
    let retention = match &settings_result {
        Some(Ok(settings)) => settings.log_retention_count,
        _ => EngineSettings::default().log_retention_count,
    };

    let options = LoggerOptions {
        stream_to_stdout: args.stream_logs,
        verbose: args.verbose,
    };
    huelens::logger::init_logger(config.log_dir.clone(), "huelens", retention, options)?;

    log_info!("HueLens main() started");
    if let Some(log_path) = huelens::logger::get_log_path() {
        log_info!("Log file: {}", log_path.display());
    }
    if args.stream_logs {
        log_info!("Streaming mode enabled via --stream-logs");
    } else {
        log_info!("Buffered mode - logs will be written to file on exit");
    }

    let settings = match settings_result {
        Some(Ok(settings)) => {
            log_info!("Loaded engine settings from {}", settings_path.display());
            settings
        }
        Some(Err(e)) => {
            log_warn!("{:#}; using default engine settings", e);
            EngineSettings::default()
        }
        None => EngineSettings::default(),
    };

    let hue_path = args.hue_file.unwrap_or_else(|| config.hue_path.clone());
    let hue = HueConfig::load_or_default(&hue_path).hue;
    log_info!("Target hue {} (from {})", hue, hue_path.display());

    log_info!("=== HueLens Starting ===");
    run_tray(overlay::OverlayManager::new(settings, hue))
}

#[cfg(not(windows))]
fn run_tray(overlay_manager: overlay::OverlayManager) -> Result<()> {
    overlay_manager.start();
    overlay_manager.join();
    anyhow::bail!("HueLens requires Windows: the overlay draws over native windows")
}

#[cfg(windows)]
#[derive(Debug)]
enum AppCommand {
    ToggleOverlay,
    Exit,
}

#[cfg(windows)]
fn tooltip(overlay_manager: &overlay::OverlayManager) -> String {
    if !overlay_manager.is_running() {
        return "HueLens\nOverlay: Inactive".to_string();
    }
    match overlay_manager.get_frame_stats() {
        Some((rate, tick_ms)) => format!(
            "HueLens\nOverlay: Active (hue {})\n{:.0} ticks/s, {:.1} ms",
            overlay_manager.hue(),
            rate,
            tick_ms
        ),
        None => format!("HueLens\nOverlay: Active (hue {})", overlay_manager.hue()),
    }
}

#[cfg(windows)]
fn run_tray(overlay_manager: overlay::OverlayManager) -> Result<()> {
    use windows::Win32::UI::WindowsAndMessaging::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT};

    let overlay_manager = Arc::new(overlay_manager);
    let (command_tx, command_rx): (Sender<AppCommand>, Receiver<AppCommand>) = bounded(10);
    let wakeup = Arc::new((parking_lot::Mutex::new(()), parking_lot::Condvar::new()));

    overlay_manager.start();

    log_info!("Loading tray icon");
    let icon = load_icon()?;

    let menu = Menu::new();
    let overlay_item = CheckMenuItem::new("Enable Overlay", true, overlay_manager.is_running(), None);
    let separator = tray_icon::menu::PredefinedMenuItem::separator();
    let exit_item = MenuItem::new("Exit", true, None);

    menu.append(&overlay_item)?;
    menu.append(&separator)?;
    menu.append(&exit_item)?;

    let overlay_id = overlay_item.id().clone();
    let exit_id = exit_item.id().clone();

    let tray_icon = TrayIconBuilder::new()
        .with_menu(Box::new(menu.clone()))
        .with_tooltip(tooltip(&overlay_manager))
        .with_icon(icon)
        .build()?;

    log_info!("Tray icon created on main thread");

    let manager_for_menu = Arc::clone(&overlay_manager);
    let wakeup_for_menu = Arc::clone(&wakeup);
    MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
        if event.id == overlay_id {
            let state = if manager_for_menu.is_running() { "OFF" } else { "ON" };
            log_info!("Toggle Overlay clicked (turning {})", state);
            let _ = command_tx.try_send(AppCommand::ToggleOverlay);
        } else if event.id == exit_id {
            log_info!("Exit clicked");
            let _ = command_tx.try_send(AppCommand::Exit);
        }
        wakeup_for_menu.1.notify_one();
    }));

    log_info!("Entering main event loop");

    let mut last_tray_update = std::time::Instant::now();

    loop {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    log_info!("WM_QUIT received, exiting");
                    overlay_manager.stop();
                    return Ok(());
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        let mut refresh_tray = last_tray_update.elapsed() >= std::time::Duration::from_millis(100);

        while let Ok(cmd) = command_rx.try_recv() {
            match cmd {
                AppCommand::ToggleOverlay => {
                    overlay_manager.toggle();
                    refresh_tray = true;
                }
                AppCommand::Exit => {
                    log_info!("Exit command - shutting down application");
                    overlay_manager.stop();
                    return Ok(());
                }
            }
        }

        if refresh_tray {
            tray_icon.set_tooltip(Some(tooltip(&overlay_manager))).ok();
            overlay_item.set_checked(overlay_manager.is_running());
            last_tray_update = std::time::Instant::now();
        }

        let mut guard = wakeup.0.lock();
        let _ = wakeup.1.wait_for(&mut guard, std::time::Duration::from_millis(100));
    }
}

#[cfg(windows)]
fn load_icon() -> Result<Icon> {
    let icon_path = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Failed to get parent directory"))?
        .join("icon.ico");

    if icon_path.exists() {
        match Icon::from_path(&icon_path, Some((32, 32))) {
            Ok(icon) => {
                log_info!("Loaded icon from {:?}", icon_path);
                return Ok(icon);
            }
            Err(e) => {
                log_warn!("Failed to load icon from {:?}: {}. Using fallback.", icon_path, e);
            }
        }
    } else {
        log_warn!("Icon file not found at {:?}. Using fallback.", icon_path);
    }

    // Hue ring: a disc whose color walks the hue circle around its center.
    let size = 16u32;
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    let center = (size as f32 - 1.0) / 2.0;
    for y in 0..size {
        for x in 0..size {
            let (dx, dy) = (x as f32 - center, y as f32 - center);
            let angle = dy.atan2(dx).to_degrees().rem_euclid(360.0);
            let (r, g, b) = huelens::HueMapper::hsv_to_rgb(angle, 0.8, 1.0);
            let alpha = if dx * dx + dy * dy <= center * center + 1.0 { 255 } else { 0 };
            rgba.extend_from_slice(&[r, g, b, alpha]);
        }
    }

    Icon::from_rgba(rgba, size, size).map_err(|e| anyhow::anyhow!("Failed to create fallback icon: {}", e))
}
