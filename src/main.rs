// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use window_snapshot::logging::init_logging;
use window_snapshot::properties::window_hidden;
use window_snapshot::settings::{SettingsManager, SnapshotSettings};
use window_snapshot::{
    report_warning, DisplayBudget, HostSignal, SnapshotCapturer, WindowHandle, X11Session,
};

#[derive(Parser, Debug)]
#[command(version, about = "Capture previews of X11 windows", long_about = None)]
struct Args {
    /// Only log errors
    #[clap(long, global = true)]
    quiet: bool,
    /// Log one JSON object per event
    #[clap(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a window preview and save it as PNG
    Capture {
        /// Window id, decimal or 0x-prefixed hex
        #[clap(value_parser = parse_window)]
        window: WindowHandle,
        /// Logical width of the preview view
        #[clap(long)]
        width: Option<u32>,
        /// Logical height of the preview view
        #[clap(long)]
        height: Option<u32>,
        /// Device pixel ratio of the preview
        #[clap(long)]
        scale: Option<f64>,
        /// Behave as if compositing were disabled
        #[clap(long)]
        no_composite: bool,
        /// Where to write the PNG, defaults to the pictures directory
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Print whether a window is hidden
    State {
        #[clap(value_parser = parse_window)]
        window: WindowHandle,
    },
    /// List snapshot sources and whether they can be used right now
    Sources,
    /// Show the saved settings, updating any that are given
    Config {
        /// Logical width of the preview view
        #[clap(long)]
        width: Option<u32>,
        /// Logical height of the preview view
        #[clap(long)]
        height: Option<u32>,
        /// Device pixel ratio of the preview
        #[clap(long)]
        scale: Option<f64>,
        /// Enable or disable the KWin screenshot effect
        #[clap(long)]
        compositor: Option<bool>,
        /// Enable or disable DXCB shared-memory images
        #[clap(long)]
        shared_memory: Option<bool>,
        /// X display for the capture connection
        #[clap(long, conflicts_with = "default_display")]
        display: Option<String>,
        /// Use `$DISPLAY` for the capture connection
        #[clap(long)]
        default_display: bool,
    },
}

/// Changes requested by `config`.
#[derive(Debug, Default, Clone, PartialEq)]
struct ConfigChanges {
    width: Option<u32>,
    height: Option<u32>,
    scale: Option<f64>,
    compositor: Option<bool>,
    shared_memory: Option<bool>,
    display: Option<Option<String>>,
}

fn parse_window(arg: &str) -> Result<WindowHandle, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed
        .map(WindowHandle)
        .map_err(|err| format!("invalid window id '{arg}': {err}"))
}

fn load_settings() -> SnapshotSettings {
    match SettingsManager::new() {
        Ok(manager) => manager.settings,
        Err(err) => {
            report_warning!("Settings", &format!("using defaults, config unavailable: {err}"));
            SnapshotSettings::default()
        }
    }
}

fn apply_config(manager: &mut SettingsManager, changes: ConfigChanges) -> Result<(), String> {
    let save_error = |err: cosmic_config::Error| format!("failed to save settings: {err}");
    let current = manager.settings.clone();

    if changes.width.is_some() || changes.height.is_some() || changes.scale.is_some() {
        manager
            .update_budget(
                changes.width.unwrap_or(current.budget_width),
                changes.height.unwrap_or(current.budget_height),
                changes.scale.unwrap_or(current.device_scale),
            )
            .map_err(save_error)?;
    }
    if let Some(enabled) = changes.compositor {
        manager.set_use_compositor(enabled).map_err(save_error)?;
    }
    if let Some(enabled) = changes.shared_memory {
        manager.set_use_shared_memory(enabled).map_err(save_error)?;
    }
    if let Some(display) = changes.display {
        manager.set_x11_display(display).map_err(save_error)?;
    }
    Ok(())
}

fn print_settings(settings: &SnapshotSettings) {
    let budget = settings.budget();
    println!(
        "view: {}x{} (margin {}, scale {})",
        settings.budget_width, settings.budget_height, settings.budget_margin, settings.device_scale
    );
    println!("budget: {}x{}", budget.width, budget.height);
    println!("compositor: {}", settings.use_compositor);
    println!("shared memory: {}", settings.use_shared_memory);
    println!(
        "display: {}",
        settings.x11_display.as_deref().unwrap_or("$DISPLAY")
    );
}

fn default_output() -> Result<PathBuf, String> {
    let dir = dirs::picture_dir().ok_or("failed to locate picture directory")?;
    let date = chrono::Local::now();
    Ok(dir.join(format!("Snapshot_{}.png", date.format("%Y-%m-%d_%H-%M-%S"))))
}

async fn capture(
    settings: &SnapshotSettings,
    session: Arc<X11Session>,
    window: WindowHandle,
    budget: DisplayBudget,
    compositing: bool,
    output: Option<PathBuf>,
) -> Result<(), String> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let capturer = SnapshotCapturer::for_session(settings, session).await.with_signals(tx);

    let snapshot = match capturer.capture(window, compositing, &budget).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            println!("compositing disabled, no snapshot for {window}");
            return Ok(());
        }
        Err(err) => {
            if let Ok(HostSignal::RecheckWindow(window)) = rx.try_recv() {
                eprintln!("window {window} may no longer exist");
            }
            return Err(err.to_string());
        }
    };

    let path = match output {
        Some(path) => path,
        None => default_output()?,
    };
    snapshot
        .bitmap
        .crop_rgba(snapshot.source_rect)
        .save(&path)
        .map_err(|err| format!("failed to save {}: {err}", path.display()))?;

    println!("{}", path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    init_logging(args.quiet, args.json_logs);

    let settings = load_settings();
    let session = Arc::new(X11Session::new(settings.x11_display.clone()));

    match args.command {
        Command::Capture {
            window,
            width,
            height,
            scale,
            no_composite,
            output,
        } => {
            let view = SnapshotSettings {
                budget_width: width.unwrap_or(settings.budget_width),
                budget_height: height.unwrap_or(settings.budget_height),
                device_scale: scale.unwrap_or(settings.device_scale),
                ..settings.clone()
            };
            capture(&settings, session, window, view.budget(), !no_composite, output).await
        }
        Command::State { window } => {
            if !session.is_connected() {
                return Err("cannot connect to the X server".to_string());
            }
            let state = if window_hidden(session.as_ref(), window) {
                "hidden"
            } else {
                "visible"
            };
            println!("{window}: {state}");
            Ok(())
        }
        Command::Sources => {
            let capturer = SnapshotCapturer::for_session(&settings, session).await;
            let available = capturer.available_sources().await;
            for kind in capturer.source_kinds() {
                let state = if available.contains(&kind) {
                    "available"
                } else {
                    "unavailable"
                };
                println!("{kind}: {state}");
            }
            Ok(())
        }
        Command::Config {
            width,
            height,
            scale,
            compositor,
            shared_memory,
            display,
            default_display,
        } => {
            let mut manager =
                SettingsManager::new().map_err(|err| format!("settings unavailable: {err}"))?;
            let changes = ConfigChanges {
                width,
                height,
                scale,
                compositor,
                shared_memory,
                display: if default_display { Some(None) } else { display.map(Some) },
            };
            apply_config(&mut manager, changes)?;
            print_settings(&manager.settings);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ids_accept_hex_and_decimal() {
        assert_eq!(parse_window("0x3a00007"), Ok(WindowHandle(0x3a0_0007)));
        assert_eq!(parse_window("42"), Ok(WindowHandle(42)));
        assert!(parse_window("window").is_err());
    }

    #[test]
    fn config_arguments_parse() {
        let args = Args::try_parse_from([
            "window-snapshot",
            "config",
            "--scale",
            "1.5",
            "--compositor",
            "false",
            "--default-display",
        ])
        .unwrap();
        match args.command {
            Command::Config {
                scale,
                compositor,
                display,
                default_display,
                ..
            } => {
                assert_eq!(scale, Some(1.5));
                assert_eq!(compositor, Some(false));
                assert_eq!(display, None);
                assert!(default_display);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from([
            "window-snapshot",
            "config",
            "--display",
            ":1",
            "--default-display",
        ])
        .is_err());
    }

    #[test]
    fn capture_arguments_parse() {
        let args = Args::try_parse_from([
            "window-snapshot",
            "--quiet",
            "capture",
            "0x400001",
            "--width",
            "300",
            "--no-composite",
        ])
        .unwrap();
        assert!(args.quiet);
        match args.command {
            Command::Capture {
                window,
                width,
                no_composite,
                ..
            } => {
                assert_eq!(window, WindowHandle(0x40_0001));
                assert_eq!(width, Some(300));
                assert!(no_composite);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
