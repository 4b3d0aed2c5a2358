pub mod viewport;

use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::warn;
use crate::chain::{Node, Position};

pub use viewport::{Viewport, ViewportConfig, ViewportFramer, CameraTransform};

/// Canvas dimensions, supplied fresh on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self { width: 800.0, height: 600.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Distance below the parent for a new node.
    pub vertical_spacing: f64,
    /// Full width of the horizontal jitter applied around the parent.
    pub horizontal_offset_range: f64,
    /// Full width of the horizontal jitter for the first node.
    pub root_offset_range: f64,
    /// First node sits at this fraction of the canvas height.
    pub root_height_ratio: f64,
    pub margin: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub collision_margin: f64,
    pub max_attempts: usize,
    /// Full width of the perturbation window on each axis.
    pub jitter_x: f64,
    pub jitter_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            vertical_spacing: 100.0,
            horizontal_offset_range: 200.0,
            root_offset_range: 300.0,
            root_height_ratio: 0.2,
            margin: 100.0,
            node_width: 140.0,
            node_height: 80.0,
            collision_margin: 75.0,
            max_attempts: 20,
            jitter_x: 300.0,
            jitter_y: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    /// Desired position was free.
    Free,
    /// A perturbed candidate was free.
    Perturbed,
    /// Search exhausted, overlapping the desired position.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Position,
    /// Collision probes performed, including the desired position.
    pub attempts: usize,
    pub kind: PlacementKind,
}

/// 布局引擎 (Layout Engine)
/// Picks a collision-free spot for the next node of the chain. Randomness
/// is always drawn from the caller's generator so layouts can be replayed.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

/// `(rand - 0.5) * span`, i.e. uniform in `[-span/2, span/2)`.
fn jitter<R: Rng + ?Sized>(rng: &mut R, span: f64) -> f64 {
    (rng.r#gen::<f64>() - 0.5) * span
}

// max(lo, min(hi, v)); unlike f64::clamp it tolerates lo > hi on tiny canvases.
fn clamp_axis(v: f64, lo: f64, hi: f64) -> f64 {
    v.min(hi).max(lo)
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Position for a new node hanging off `parent` (or the first node when `None`).
    pub fn compute_position<R: Rng + ?Sized>(
        &self,
        canvas: Canvas,
        existing: &[Node],
        parent: Option<&Node>,
        rng: &mut R,
    ) -> Position {
        let desired = self.desired_position(canvas, parent, rng);
        self.resolve(desired, existing, canvas, rng).position
    }

    /// Step 1: where the node would go on an empty canvas.
    pub fn desired_position<R: Rng + ?Sized>(&self, canvas: Canvas, parent: Option<&Node>, rng: &mut R) -> Position {
        let c = &self.config;
        match parent {
            Some(p) => Position::new(
                p.position.x + jitter(rng, c.horizontal_offset_range),
                p.position.y + c.vertical_spacing,
            ),
            None => Position::new(
                canvas.width / 2.0 + jitter(rng, c.root_offset_range),
                canvas.height * c.root_height_ratio,
            ),
        }
    }

    pub fn clamp(&self, pos: Position, canvas: Canvas) -> Position {
        let c = &self.config;
        Position::new(
            clamp_axis(pos.x, c.margin, canvas.width - c.margin - c.node_width),
            clamp_axis(pos.y, c.margin, canvas.height - c.margin - c.node_height),
        )
    }

    /// Margin-expanded bounding boxes overlap on both axes.
    pub fn collides(&self, a: Position, b: Position) -> bool {
        let c = &self.config;
        let w = c.node_width + c.collision_margin;
        let h = c.node_height + c.collision_margin;
        !(a.x + w < b.x || b.x + w < a.x || a.y + h < b.y || b.y + h < a.y)
    }

    fn is_free(&self, pos: Position, existing: &[Node]) -> bool {
        !existing.iter().any(|n| self.collides(pos, n.position))
    }

    /// Steps 2-5: clamp, probe, perturb, fall back. Always returns within
    /// `1 + max_attempts` probes.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        desired: Position,
        existing: &[Node],
        canvas: Canvas,
        rng: &mut R,
    ) -> Placement {
        let c = &self.config;
        let desired = self.clamp(desired, canvas);

        if self.is_free(desired, existing) {
            return Placement { position: desired, attempts: 1, kind: PlacementKind::Free };
        }

        for attempt in 0..c.max_attempts {
            let candidate = self.clamp(
                Position::new(
                    desired.x + jitter(rng, c.jitter_x),
                    desired.y + jitter(rng, c.jitter_y),
                ),
                canvas,
            );
            if self.is_free(candidate, existing) {
                return Placement { position: candidate, attempts: attempt + 2, kind: PlacementKind::Perturbed };
            }
        }

        warn!(
            x = desired.x,
            y = desired.y,
            attempts = c.max_attempts + 1,
            "Layout search exhausted, placing node over an existing one"
        );
        Placement { position: desired, attempts: c.max_attempts + 1, kind: PlacementKind::Fallback }
    }
}
