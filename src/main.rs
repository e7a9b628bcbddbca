//! Confab - A voice conversation panel for Linux
//!
//! This is the main entry point for the Confab application.

mod agent;
mod app;
mod assets;
mod audio;
mod cli;
mod models;
mod settings;
mod state;
mod tokio_runtime;

use app::ConversationPanel;
use assets::Assets;
use clap::Parser;
use gpui::prelude::*;
use gpui::*;
use log::info;

fn main() {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Confab voice panel");

    Application::new().with_assets(Assets).run(|cx: &mut App| {
        // Initialize global Tokio runtime for the WebSocket session
        tokio_runtime::init(cx);
        let bounds = Bounds::centered(None, size(px(460.0), px(720.0)), cx);
        cx.open_window(
            WindowOptions {
                window_bounds: Some(WindowBounds::Windowed(bounds)),
                // No titlebar - we'll draw our own
                titlebar: None,
                // Use client-side decorations so we can draw our own titlebar
                window_decorations: Some(WindowDecorations::Client),
                // App ID for Wayland/GNOME desktop integration - matches .desktop file
                app_id: Some("chat.confab.VoicePanel".to_string()),
                ..Default::default()
            },
            |window, cx| {
                // Set app_id on the window for proper desktop integration
                window.set_app_id("chat.confab.VoicePanel");
                cx.new(ConversationPanel::new)
            },
        )
        .expect("Failed to open window");
    });
}
