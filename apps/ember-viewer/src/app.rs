//! Viewer application.

use ember_app::{AppContext, EmberApp, UiOverlay, Window, WindowEvent};
use tracing::info;

use crate::overlay::ImguiOverlay;

/// The demo: all drawing happens in the renderer, the app only owns the UI.
pub struct Viewer {
    overlay: ImguiOverlay,
}

impl EmberApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let overlay = ImguiOverlay::new(ctx)?;

        let names: Vec<_> = ctx
            .renderer
            .effects()
            .iter()
            .map(|effect| effect.name.as_str())
            .collect();
        info!(effects = ?names, "Viewer initialized");

        Ok(Self { overlay })
    }

    fn overlay(&mut self) -> &mut dyn UiOverlay {
        &mut self.overlay
    }

    fn on_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.overlay.handle_event(window, event)
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        self.overlay.shutdown();
    }
}
