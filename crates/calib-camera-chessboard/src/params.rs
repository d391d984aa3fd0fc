use serde::{Deserialize, Serialize};

/// Neighbour search and topology tolerances for grid assembly.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Candidates examined per corner in the k-d tree query.
    pub k_neighbors: usize,
    /// Candidates closer than this are treated as duplicates and skipped.
    pub min_spacing_pix: f32,
    /// Upper bound on an edge, relative to the corner's nearest-neighbour
    /// distance.
    pub max_spacing_ratio: f32,
    /// Maximum angle between an edge and the grid axis it is assigned to.
    pub direction_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            min_spacing_pix: 3.0,
            max_spacing_ratio: 1.8,
            direction_tolerance_deg: 22.5,
        }
    }
}

/// Termination criteria of the iterative gradient corner refinement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Half side of the search window; `5` gives an 11×11 window.
    pub half_window: usize,
    pub max_iterations: usize,
    /// Stop once a step moves the corner by less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iterations: 30,
            epsilon: 0.001,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// ChESS threshold relative to the strongest response in the image.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius of the ChESS detector, in pixels.
    pub nms_radius: u32,
    /// Corners weaker than this are dropped before grid assembly.
    pub min_strength: f32,
    pub graph: GridGraphParams,
    pub subpix: SubpixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
            min_strength: 0.0,
            graph: GridGraphParams::default(),
            subpix: SubpixParams::default(),
        }
    }
}
