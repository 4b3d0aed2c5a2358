use serde::{Serialize, Deserialize};
use crate::chain::Node;
use crate::layout::Canvas;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub window_size: usize,
    pub vertical_spacing: f64,
    pub padding: f64,
    /// Horizontal span never treated as narrower than this.
    pub min_span: f64,
    pub zoom_floor: f64,
    pub zoom_cap: f64,
    /// Camera animation length the renderer should use.
    pub transition_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            vertical_spacing: 100.0,
            padding: 180.0,
            min_span: 400.0,
            zoom_floor: 0.6,
            zoom_cap: 0.8,
            transition_ms: 800,
        }
    }
}

/// Camera center and zoom in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
}

/// Renderer-facing pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub zoom: f64,
    pub duration_ms: u64,
}

impl Viewport {
    /// Translation that puts the viewport center in the middle of the canvas.
    pub fn transform(&self, canvas: Canvas, duration_ms: u64) -> CameraTransform {
        CameraTransform {
            translate_x: canvas.width / 2.0 - self.center_x * self.zoom,
            translate_y: canvas.height / 2.0 - self.center_y * self.zoom,
            zoom: self.zoom,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewportFramer {
    config: ViewportConfig,
}

impl ViewportFramer {
    pub fn new(config: ViewportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    /// Frames the last `window_size` nodes, leaving room below for the next one.
    pub fn frame(&self, nodes: &[Node], canvas: Canvas) -> Option<Viewport> {
        let c = &self.config;
        let window = &nodes[nodes.len().saturating_sub(c.window_size)..];
        if window.is_empty() {
            return None;
        }

        let (mut min_x, mut max_x, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for node in window {
            min_x = min_x.min(node.position.x);
            max_x = max_x.max(node.position.x);
            max_y = max_y.max(node.position.y);
        }

        let span = (max_x - min_x).max(c.min_span);
        let fit = ((canvas.width - 2.0 * c.padding) / span).min(c.zoom_cap);
        let zoom = fit.max(c.zoom_floor).min(c.zoom_cap);

        Some(Viewport {
            center_x: (min_x + max_x) / 2.0,
            center_y: max_y - 1.5 * c.vertical_spacing,
            zoom,
        })
    }
}
