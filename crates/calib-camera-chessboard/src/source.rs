use crate::params::ChessboardParams;
use calib_camera_core::Corner;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Front end producing X-corner candidates for grid assembly.
pub trait CornerSource: Send + Sync {
    fn detect(&self, img: &image::GrayImage) -> Vec<Corner>;
}

/// ChESS corner candidates from the `chess-corners` crate.
pub struct ChessCornerSource {
    cfg: ChessConfig,
}

impl ChessCornerSource {
    pub fn new(params: &ChessboardParams) -> Self {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = params.threshold_rel;
        cfg.params.nms_radius = params.nms_radius;
        Self { cfg }
    }

    pub fn config(&self) -> &ChessConfig {
        &self.cfg
    }
}

impl Default for ChessCornerSource {
    fn default() -> Self {
        Self::new(&ChessboardParams::default())
    }
}

impl CornerSource for ChessCornerSource {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = img.width(), height = img.height()))
    )]
    fn detect(&self, img: &image::GrayImage) -> Vec<Corner> {
        find_chess_corners_image(img, &self.cfg)
            .iter()
            .map(adapt_chess_corner)
            .collect()
    }
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner::new(c.x, c.y, c.response)
}
