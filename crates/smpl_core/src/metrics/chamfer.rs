//! Chamfer distance between batches of point clouds, brute force nearest
//! neighbours on the CPU.

use crate::error::SmplError;
use log::warn;
use ndarray as nd;
use ndarray::prelude::*;
use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Reduction {
    Sum,
    Mean,
    /// Keep the axis
    #[strum(serialize = "none")]
    Keep,
}

#[derive(Clone, Copy, Debug)]
pub struct ChamferOptions {
    /// Forward plus backward term, takes precedence over `reverse`
    pub bidirectional: bool,
    /// Only the target to source term
    pub reverse: bool,
    pub point_reduction: Reduction,
    pub batch_reduction: Reduction,
}
impl Default for ChamferOptions {
    fn default() -> Self {
        Self {
            bidirectional: false,
            reverse: false,
            point_reduction: Reduction::Sum,
            batch_reduction: Reduction::Mean,
        }
    }
}

/// Nearest neighbour in `p2` for every point of `p1`, per batch.
///
/// Both clouds are `[batch, nr_points, dim]`. Returns squared distances and
/// indices, both `[batch, nr_points_p1]`. Ties keep the lowest index.
pub fn knn_points_1(p1: &nd::ArrayView3<f32>, p2: &nd::ArrayView3<f32>) -> (nd::Array2<f32>, nd::Array2<usize>) {
    let (batch, nr_points, _) = p1.dim();
    let mut dists = nd::Array2::<f32>::from_elem((batch, nr_points), f32::INFINITY);
    let mut idx = nd::Array2::<usize>::zeros((batch, nr_points));
    for (b, (cloud_1, cloud_2)) in p1.outer_iter().zip(p2.outer_iter()).enumerate() {
        for (i, point) in cloud_1.outer_iter().enumerate() {
            for (j, candidate) in cloud_2.outer_iter().enumerate() {
                let dist: f32 = point.iter().zip(candidate.iter()).map(|(a, c)| (a - c) * (a - c)).sum();
                if dist < dists[[b, i]] {
                    dists[[b, i]] = dist;
                    idx[[b, i]] = j;
                }
            }
        }
    }
    (dists, idx)
}

fn reduce_points(dists: nd::Array2<f32>, reduction: Reduction) -> nd::ArrayD<f32> {
    match reduction {
        Reduction::Sum => dists.sum_axis(Axis(1)).into_dyn(),
        Reduction::Mean => dists.mean_axis(Axis(1)).map_or_else(|| nd::Array1::zeros(dists.nrows()).into_dyn(), |mean| mean.into_dyn()),
        Reduction::Keep => dists.into_dyn(),
    }
}

fn reduce_batch(values: nd::ArrayD<f32>, reduction: Reduction) -> nd::ArrayD<f32> {
    match reduction {
        Reduction::Sum => nd::arr0(values.sum()).into_dyn(),
        Reduction::Mean => nd::arr0(values.mean().unwrap_or(0.0)).into_dyn(),
        Reduction::Keep => values,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ChamferDistance {
    pub options: ChamferOptions,
}
impl ChamferDistance {
    pub fn new(options: ChamferOptions) -> Self {
        Self { options }
    }

    /// Chamfer distance from `source` to `target`, both `[batch, nr_points, dim]`.
    ///
    /// The result is 0-d when both reductions are applied, `[batch]` with only
    /// the point reduction, `[batch, nr_points]` with none, and the flattened
    /// per-point values when only the batch reduction is skipped.
    ///
    /// # Errors
    /// Will error if the batch sizes or point dimensions differ, or if a
    /// bidirectional distance without any reduction is asked for clouds of
    /// different sizes
    pub fn compute(&self, source: &nd::ArrayView3<f32>, target: &nd::ArrayView3<f32>) -> Result<nd::ArrayD<f32>, SmplError> {
        let opts = &self.options;
        let (batch_source, points_source, dim_source) = source.dim();
        let (batch_target, points_target, dim_target) = target.dim();
        if batch_source != batch_target {
            return Err(SmplError::InvalidPointCloud(format!(
                "Source and target pointclouds must have the same batchsize ({batch_source} vs {batch_target})"
            )));
        }
        if dim_source != dim_target {
            return Err(SmplError::InvalidPointCloud(format!(
                "Source and target pointclouds must have the same dimensionality ({dim_source} vs {dim_target})"
            )));
        }
        if opts.bidirectional && opts.reverse {
            warn!("Both bidirectional and reverse set to true; bidirectional takes precedence.");
        }
        let needs_backward = opts.bidirectional || opts.reverse;
        // per-point terms can only be added when neither reduction collapses them
        let unreduced = opts.point_reduction == Reduction::Keep && opts.batch_reduction == Reduction::Keep;
        if opts.bidirectional && unreduced && points_source != points_target {
            return Err(SmplError::InvalidPointCloud(format!(
                "cannot add per-point distances of {points_source} and {points_target} points"
            )));
        }

        let (forward_dists, _) = knn_points_1(source, target);
        let forward = reduce_batch(reduce_points(forward_dists, opts.point_reduction), opts.batch_reduction);
        if !needs_backward {
            return Ok(forward);
        }

        let (backward_dists, _) = knn_points_1(target, source);
        let backward = reduce_batch(reduce_points(backward_dists, opts.point_reduction), opts.batch_reduction);
        if opts.bidirectional {
            Ok(forward + backward)
        } else {
            Ok(backward)
        }
    }

    /// Convenience for fully reduced distances
    ///
    /// # Errors
    /// Same as [`Self::compute`], and if a reduction is set to keep its axis
    pub fn compute_scalar(&self, source: &nd::ArrayView3<f32>, target: &nd::ArrayView3<f32>) -> Result<f32, SmplError> {
        let dist = self.compute(source, target)?;
        if dist.ndim() != 0 {
            return Err(SmplError::InvalidPointCloud(format!(
                "distance has shape {:?}, not a scalar",
                dist.shape()
            )));
        }
        Ok(dist.sum())
    }
}

/// The two 2x5x3 point cloud batches used to sanity check the distance
pub fn reference_clouds() -> (nd::Array3<f32>, nd::Array3<f32>) {
    let p1 = array![
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.5, 0.5, 0.5]],
        [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, -1.0], [1.0, 1.0, -1.0], [0.5, 0.5, -1.5]],
    ];
    let p2 = array![
        [[0.1, 0.0, 0.0], [-2.0, 0.0, 0.0], [0.0, -1.1, 0.0], [1.0, -1.1, 0.0], [0.5, 0.5, 0.6]],
        [[0.0, 0.0, 0.9], [1.0, 0.0, 1.1], [0.0, 1.0, 0.9], [1.0, 1.0, 1.1], [0.5, 0.5, 2.0]],
    ];
    (p1, p2)
}
