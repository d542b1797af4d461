use ndarray as nd;
use ndarray::s;

/// Axis-angle pose of the kinematic tree. The first row is the global
/// orientation, the following rows rotate each non-root joint.
#[derive(Clone, Debug)]
pub struct Pose {
    pub joint_poses: nd::Array2<f32>,
}
impl Pose {
    pub fn new_empty(num_joints: usize) -> Self {
        Self {
            joint_poses: nd::Array2::zeros((num_joints, 3)),
        }
    }
    /// `body_pose` holds one row per non-root joint
    pub fn new(global_orient: &nd::Array1<f32>, body_pose: &nd::Array2<f32>) -> Self {
        let mut joint_poses = nd::Array2::zeros((body_pose.nrows() + 1, 3));
        joint_poses.row_mut(0).assign(global_orient);
        joint_poses.slice_mut(s![1.., ..]).assign(body_pose);
        Self { joint_poses }
    }
    /// Global orientation components all set to `global_orient` and every
    /// body joint component set to `body_pose`
    pub fn new_filled(num_joints: usize, global_orient: f32, body_pose: f32) -> Self {
        let mut joint_poses = nd::Array2::from_elem((num_joints, 3), body_pose);
        joint_poses.row_mut(0).fill(global_orient);
        Self { joint_poses }
    }
    pub fn num_joints(&self) -> usize {
        self.joint_poses.nrows()
    }
    pub fn global_orient(&self) -> nd::ArrayView1<f32> {
        self.joint_poses.row(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn filled_pose_separates_root() {
        let pose = Pose::new_filled(24, 0.7, -0.2);
        assert_eq!(pose.num_joints(), 24);
        assert_eq!(pose.global_orient(), array![0.7, 0.7, 0.7]);
        assert!(pose.joint_poses.slice(s![1.., ..]).iter().all(|&v| v == -0.2));
    }

    #[test]
    fn explicit_pose_stacks_rows() {
        let pose = Pose::new(&array![1.0, 2.0, 3.0], &array![[4.0, 5.0, 6.0]]);
        assert_eq!(pose.joint_poses, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }
}
