//! Global Tokio runtime for async operations requiring Tokio
//!
//! GPUI uses its own async executor, but the WebSocket session
//! (tokio-tungstenite) requires a Tokio runtime. This module provides a
//! lazy-initialized global Tokio runtime for such operations.
//!
//! Inspired by zed-industries/zed gpui_tokio crate.

use gpui::App;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initialize the global Tokio runtime. Call this during app startup.
pub fn init(_cx: &mut App) {
    TOKIO_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to create Tokio runtime")
    });
}

/// Get the global Tokio runtime handle
pub fn handle() -> tokio::runtime::Handle {
    TOKIO_RUNTIME
        .get()
        .expect("Tokio runtime not initialized - call tokio_runtime::init() first")
        .handle()
        .clone()
}
