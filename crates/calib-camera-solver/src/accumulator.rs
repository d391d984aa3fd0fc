//! Per-view bookkeeping between detection and the solve.

use crate::error::AccumulateError;
use calib_camera_core::{CornerSet, ObjectPointGrid};
use nalgebra::{Point2, Point3};

/// Object/image point pairs of every accepted view, in acceptance order.
///
/// The two sequences always have the same length and each pair is
/// index-aligned and of equal size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrespondenceSet {
    object_points_per_view: Vec<ObjectPointGrid>,
    image_points_per_view: Vec<Vec<Point2<f64>>>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one view; rejects a pair whose lengths differ.
    pub fn push(
        &mut self,
        object_points: ObjectPointGrid,
        image_points: Vec<Point2<f64>>,
    ) -> Result<(), AccumulateError> {
        if object_points.len() != image_points.len() {
            return Err(AccumulateError::LengthMismatch {
                expected: object_points.len(),
                got: image_points.len(),
            });
        }
        self.object_points_per_view.push(object_points);
        self.image_points_per_view.push(image_points);
        Ok(())
    }

    pub fn num_views(&self) -> usize {
        self.object_points_per_view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points_per_view.is_empty()
    }

    /// Total number of point pairs over all views.
    pub fn num_points(&self) -> usize {
        self.image_points_per_view.iter().map(Vec::len).sum()
    }

    pub fn object_points_per_view(&self) -> &[ObjectPointGrid] {
        &self.object_points_per_view
    }

    pub fn image_points_per_view(&self) -> &[Vec<Point2<f64>>] {
        &self.image_points_per_view
    }

    /// `(object points, image points)` of view `index`.
    pub fn view(&self, index: usize) -> Option<(&[Point3<f64>], &[Point2<f64>])> {
        let obj = self.object_points_per_view.get(index)?;
        let img = self.image_points_per_view.get(index)?;
        Some((obj.points(), img))
    }

    pub fn views(&self) -> impl Iterator<Item = (&[Point3<f64>], &[Point2<f64>])> + '_ {
        self.object_points_per_view
            .iter()
            .zip(&self.image_points_per_view)
            .map(|(obj, img)| (obj.points(), img.as_slice()))
    }
}

/// An image that did not contribute a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewFailure {
    /// Position of the image in the processing order.
    pub image_index: usize,
    pub reason: String,
}

/// Collects detection outcomes into a [`CorrespondenceSet`].
#[derive(Clone, Debug)]
pub struct CorrespondenceAccumulator {
    grid: ObjectPointGrid,
    set: CorrespondenceSet,
    accepted: Vec<usize>,
    failures: Vec<ViewFailure>,
}

impl CorrespondenceAccumulator {
    pub fn new(grid: ObjectPointGrid) -> Self {
        Self {
            grid,
            set: CorrespondenceSet::new(),
            accepted: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Add the corners of image `image_index`. A corner set whose length
    /// differs from the grid is rejected and counted as a failure.
    pub fn push(&mut self, image_index: usize, corners: CornerSet) -> Result<(), AccumulateError> {
        match self.set.push(self.grid.clone(), corners.points) {
            Ok(()) => {
                self.accepted.push(image_index);
                Ok(())
            }
            Err(err) => {
                log::warn!("image #{image_index} rejected: {err}");
                self.record_failure(image_index, err.to_string());
                Err(err)
            }
        }
    }

    /// Count an image that produced no corner set.
    pub fn record_failure(&mut self, image_index: usize, reason: impl Into<String>) {
        self.failures.push(ViewFailure {
            image_index,
            reason: reason.into(),
        });
    }

    pub fn successes(&self) -> usize {
        self.set.num_views()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[ViewFailure] {
        &self.failures
    }

    /// Image indices of the accepted views, in view order.
    pub fn accepted_images(&self) -> &[usize] {
        &self.accepted
    }

    pub fn correspondences(&self) -> &CorrespondenceSet {
        &self.set
    }

    pub fn finish(self) -> CorrespondenceSet {
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_camera_core::{ImageRotation, PatternGeometry};

    fn corner_set(n: usize) -> CornerSet {
        CornerSet {
            points: (0..n).map(|k| Point2::new(k as f64, 0.5 * k as f64)).collect(),
            rotation: ImageRotation::Deg0,
            image_size: (640, 480),
        }
    }

    fn grid() -> ObjectPointGrid {
        PatternGeometry::new(3, 2, 1.5).unwrap().object_points()
    }

    fn assert_parallel(set: &CorrespondenceSet) {
        assert_eq!(
            set.object_points_per_view().len(),
            set.image_points_per_view().len()
        );
        for (obj, img) in set.views() {
            assert_eq!(obj.len(), img.len());
        }
    }

    #[test]
    fn empty_accumulator_is_consistent() {
        let acc = CorrespondenceAccumulator::new(grid());
        assert_eq!(acc.successes(), 0);
        assert_eq!(acc.failure_count(), 0);
        assert!(acc.correspondences().is_empty());
        assert_parallel(acc.correspondences());
    }

    #[test]
    fn sequences_stay_parallel_through_every_push() {
        let mut acc = CorrespondenceAccumulator::new(grid());
        acc.push(0, corner_set(6)).unwrap();
        assert_parallel(acc.correspondences());
        assert_eq!(acc.successes(), 1);

        acc.record_failure(1, "pattern not found");
        for i in 2..7 {
            acc.push(i, corner_set(6)).unwrap();
            assert_parallel(acc.correspondences());
        }
        assert_eq!(acc.successes(), 6);
        assert_eq!(acc.failure_count(), 1);
        assert_eq!(acc.accepted_images(), &[0, 2, 3, 4, 5, 6]);

        let set = acc.finish();
        assert_eq!(set.num_views(), 6);
        assert_eq!(set.num_points(), 36);
        assert!(set
            .object_points_per_view()
            .windows(2)
            .all(|w| w[0].shares_storage_with(&w[1])));
    }

    #[test]
    fn short_corner_set_is_rejected_and_counted() {
        let mut acc = CorrespondenceAccumulator::new(grid());
        acc.push(0, corner_set(6)).unwrap();
        let err = acc.push(1, corner_set(5)).unwrap_err();
        assert_eq!(
            err,
            AccumulateError::LengthMismatch {
                expected: 6,
                got: 5
            }
        );
        assert_eq!(acc.successes(), 1);
        assert_eq!(acc.failures()[0].image_index, 1);
        assert_parallel(acc.correspondences());
    }

    #[test]
    fn view_lookup_is_bounds_checked() {
        let mut set = CorrespondenceSet::new();
        set.push(grid(), corner_set(6).points).unwrap();
        let (obj, img) = set.view(0).unwrap();
        assert_eq!(obj[1], Point3::new(1.5, 0.0, 0.0));
        assert_eq!(img[1], Point2::new(1.0, 0.5));
        assert!(set.view(1).is_none());
    }
}
