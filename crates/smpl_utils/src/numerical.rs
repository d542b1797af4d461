use ndarray as nd;
use ndarray::prelude::*;
use std::ops::{Div, SubAssign};

/// Offset added to every axis-angle component before taking the norm, so a
/// zero rotation still yields a finite axis
pub const RODRIGUES_EPS: f32 = 1e-8;

pub fn batch_rodrigues(full_pose: &nd::Array2<f32>) -> nd::Array3<f32> {
    // Calculates the rotation matrices for a batch of rotation vectors
    let mut rotations_per_join = ndarray::Array3::<f32>::zeros((full_pose.nrows(), 3, 3));

    for (idx, v) in full_pose.axis_iter(nd::Axis(0)).enumerate() {
        let angle = v.iter().map(|x| (x + RODRIGUES_EPS) * (x + RODRIGUES_EPS)).sum::<f32>().sqrt(); //l2 norm

        let rot_dir = v.to_owned().div(angle);
        let cos = angle.cos();
        let sin = angle.sin();

        let (rx, ry, rz) = (rot_dir[0], rot_dir[1], rot_dir[2]);

        let k = array![[0.0, -rz, ry], [rz, 0.0, -rx], [-ry, rx, 0.0]];
        let identity = ndarray::Array2::<f32>::eye(3);
        let rot_mat = identity + sin * &k + (1.0 - cos) * k.dot(&k);
        rotations_per_join.slice_mut(s![idx, .., ..]).assign(&rot_mat);
    }

    rotations_per_join
}

/// Chains the per-joint rotations along the kinematic tree.
///
/// `parent_idx_per_joint[i]` must be smaller than `i` for every non-root
/// joint; the root entry is ignored. Returns the posed joint positions and
/// the rigid transforms relative to each joint's rest position, shaped
/// `[nr_joints, 4, 4]`.
#[allow(clippy::similar_names)]
pub fn batch_rigid_transform(
    parent_idx_per_joint: &[usize],
    rot_mats: &nd::Array3<f32>,
    joints: &nd::Array2<f32>,
) -> (nd::Array2<f32>, nd::Array3<f32>) {
    let num_joints = joints.nrows();
    let mut rel_joints = joints.clone(); //contains the relative position to the parent joint

    // rel_joints[:, 1:] -= joints[:, parents[1:]]
    for (idx_cur, &idx_parent) in parent_idx_per_joint.iter().enumerate().skip(1) {
        let parent_joint_position = joints.row(idx_parent);
        rel_joints.row_mut(idx_cur).sub_assign(&parent_joint_position);
    }

    let mut transforms_mat = ndarray::Array3::<f32>::zeros((num_joints, 4, 4));
    for idx in 0..num_joints {
        transforms_mat.slice_mut(s![idx, 0..3, 0..3]).assign(&rot_mats.slice(s![idx, .., ..]));
        transforms_mat.slice_mut(s![idx, 0..3, 3]).assign(&rel_joints.row(idx));
        transforms_mat.slice_mut(s![idx, 3, 0..4]).assign(&array![0.0, 0.0, 0.0, 1.0]);
    }

    let mut transform_chain: Vec<nd::Array2<f32>> = Vec::with_capacity(num_joints);
    transform_chain.push(transforms_mat.slice(s![0, .., ..]).to_owned());
    for i in 1..num_joints {
        let mat_1 = &transform_chain[parent_idx_per_joint[i]];
        let curr_res = mat_1.dot(&transforms_mat.slice(s![i, .., ..]));
        transform_chain.push(curr_res);
    }

    //get posed joints as just the translation part of the transform chain
    let mut posed_joints = joints.clone();
    for (i, tf) in transform_chain.iter().enumerate() {
        posed_joints.row_mut(i).assign(&tf.slice(s![0..3, 3]));
    }

    //The relative (with respect to the rest joint) rigid transformations for all
    // the joints
    let mut rel_transforms = ndarray::Array3::<f32>::zeros((num_joints, 4, 4));
    for (i, transform) in transform_chain.iter().enumerate() {
        let joint = joints.row(i);
        let joint_homogen = array![joint[0], joint[1], joint[2], 0.0];
        let transformed_joint = transform.dot(&joint_homogen);

        let mut transformed_joint_4 = nd::Array2::<f32>::zeros((4, 4));
        transformed_joint_4.slice_mut(s![0..4, 3]).assign(&transformed_joint);

        rel_transforms.slice_mut(s![i, .., ..]).assign(&(transform - &transformed_joint_4));
    }

    (posed_joints, rel_transforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn assert_close(a: &nd::ArrayView2<f32>, b: &nd::ArrayView2<f32>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{a} != {b}");
        }
    }

    #[test]
    fn zero_rotation_is_identity() {
        let rots = batch_rodrigues(&nd::Array2::zeros((2, 3)));
        let eye = nd::Array2::<f32>::eye(3);
        assert_close(&rots.slice(s![0, .., ..]), &eye.view());
        assert_close(&rots.slice(s![1, .., ..]), &eye.view());
    }

    #[test]
    fn quarter_turn_about_z() {
        let rots = batch_rodrigues(&array![[0.0, 0.0, FRAC_PI_2]]);
        let expected = array![[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        assert_close(&rots.slice(s![0, .., ..]), &expected.view());
    }

    #[test]
    fn rigid_transform_rotates_child_about_parent() {
        let joints = array![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let mut rots = nd::Array3::<f32>::zeros((2, 3, 3));
        rots.slice_mut(s![0, .., ..]).assign(&array![[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        rots.slice_mut(s![1, .., ..]).assign(&nd::Array2::eye(3));

        let (posed, rel) = batch_rigid_transform(&[0, 0], &rots, &joints);

        assert_close(&posed.view(), &array![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]].view());
        // the root transform keeps its own joint fixed
        let root_joint: nd::Array1<f32> = array![1.0, 0.0, 0.0, 1.0];
        let root_transform: nd::ArrayView2<f32> = rel.slice(s![0, .., ..]);
        let moved: nd::Array1<f32> = root_transform.dot(&root_joint);
        assert!((moved[0] - 1.0).abs() < 1e-6 && moved[1].abs() < 1e-6);
    }
}
