//! Planning a full-screen chessboard for a given display.
//!
//! The physical pixel size follows from the diagonal; the board fills a
//! fraction of the screen with cells near a preferred physical size, an even
//! cell count per axis before capping the corner counts, and integer pixel
//! cells. The resulting [`TargetConfig`] records the measured cell size.

use crate::config::{ConfigError, TargetConfig};
use serde::{Deserialize, Serialize};

const CM_PER_INCH: f64 = 2.54;

/// Display the board is shown on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenSpec {
    pub width_px: u32,
    pub height_px: u32,
    pub diagonal_inch: f64,
    #[serde(default)]
    pub display_index: u32,
}

/// Sizing rules for the displayed board.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    /// Fraction of each screen dimension available to the board.
    pub fill_ratio: f64,
    pub min_cell_cm: f64,
    pub max_cell_cm: f64,
    /// Upper bound on inner corners along x and y.
    pub max_corners: [u32; 2],
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            fill_ratio: 0.9,
            min_cell_cm: 1.5,
            max_cell_cm: 2.5,
            max_corners: [15, 11],
        }
    }
}

/// Pixel geometry of the planned board; cells start at the top-left pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLayout {
    pub corners: [u32; 2],
    pub cells: [u32; 2],
    pub cell_width_px: u32,
    pub cell_height_px: u32,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn cells_along(usable_cm: f64, cell_cm: f64, max_corners: u32) -> u32 {
    let mut cells = (usable_cm / cell_cm).floor() as u32;
    if cells % 2 == 1 {
        cells -= 1;
    }
    cells.saturating_sub(1).min(max_corners) + 1
}

/// Plan the board for `screen` and describe it as a target record.
pub fn plan_target(
    screen: &ScreenSpec,
    policy: &LayoutPolicy,
) -> Result<(TargetConfig, BoardLayout), ConfigError> {
    if screen.width_px == 0 || screen.height_px == 0 {
        return Err(ConfigError::Screen(format!(
            "resolution {}x{} is empty",
            screen.width_px, screen.height_px
        )));
    }
    if !(screen.diagonal_inch.is_finite() && screen.diagonal_inch > 0.0) {
        return Err(ConfigError::Screen(format!(
            "diagonal must be positive (got {})",
            screen.diagonal_inch
        )));
    }
    if !(policy.fill_ratio > 0.0 && policy.fill_ratio <= 1.0) {
        return Err(ConfigError::Screen(format!(
            "fill ratio must lie in (0, 1] (got {})",
            policy.fill_ratio
        )));
    }
    let cell_cm = 0.5 * (policy.min_cell_cm + policy.max_cell_cm);
    if !(cell_cm.is_finite() && cell_cm > 0.0) {
        return Err(ConfigError::Screen(format!(
            "preferred cell size must be positive (got {cell_cm})"
        )));
    }

    let (w, h) = (screen.width_px as f64, screen.height_px as f64);
    let pixel_size_cm = screen.diagonal_inch * CM_PER_INCH / w.hypot(h);
    let usable_w = w * pixel_size_cm * policy.fill_ratio;
    let usable_h = h * pixel_size_cm * policy.fill_ratio;

    let cells_x = cells_along(usable_w, cell_cm, policy.max_corners[0]);
    let cells_y = cells_along(usable_h, cell_cm, policy.max_corners[1]);
    if cells_x < 3 || cells_y < 3 {
        return Err(ConfigError::Screen(format!(
            "{:.1}x{:.1} cm leaves room for only {cells_x}x{cells_y} cells of {cell_cm} cm",
            usable_w, usable_h
        )));
    }

    let layout = BoardLayout {
        corners: [cells_x - 1, cells_y - 1],
        cells: [cells_x, cells_y],
        cell_width_px: screen.width_px / cells_x,
        cell_height_px: screen.height_px / cells_y,
    };
    let cell_size_cm =
        0.5 * (layout.cell_width_px + layout.cell_height_px) as f64 * pixel_size_cm;

    let target = TargetConfig {
        chessboard_corners: layout.corners,
        chessboard_cell_size_cm: round_to(cell_size_cm, 2),
        screen_resolution: Some([screen.width_px, screen.height_px]),
        physical_diagonal_inch: Some(screen.diagonal_inch),
        pixel_size_cm: Some(round_to(pixel_size_cm, 5)),
        chessboard_cells: Some(layout.cells),
        chessboard_display_ratio: Some(policy.fill_ratio),
        target_display_index: Some(screen.display_index),
    };
    target.geometry()?;
    log::info!(
        "planned {}x{} corners, {}x{} px cells ({:.2} cm)",
        layout.corners[0],
        layout.corners[1],
        layout.cell_width_px,
        layout.cell_height_px,
        cell_size_cm
    );
    Ok((target, layout))
}

/// Full-screen image of the planned board: cell `(x, y)` is white when
/// `x + y` is even, everything outside the cells is black.
pub fn render_board(screen: &ScreenSpec, layout: &BoardLayout) -> image::GrayImage {
    let board_w = layout.cells[0] * layout.cell_width_px;
    let board_h = layout.cells[1] * layout.cell_height_px;
    image::GrayImage::from_fn(screen.width_px, screen.height_px, |x, y| {
        if x >= board_w || y >= board_h {
            return image::Luma([0]);
        }
        let cx = x / layout.cell_width_px.max(1);
        let cy = y / layout.cell_height_px.max(1);
        if (cx + cy) % 2 == 0 {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}
