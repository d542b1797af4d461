use super::{betas::Betas, outputs::SmplOutput, pose::Pose, types::Gender};
use crate::codec::model_file::{JsonModelArrays, ModelArrays, NpzModelArrays};
use crate::error::SmplError;
use log::{debug, info};
use ndarray as nd;
use ndarray::prelude::*;
use smpl_utils::io::FileType;
use smpl_utils::numerical::{batch_rigid_transform, batch_rodrigues};
use std::path::Path;

/// SMPL body model evaluated on the CPU.
///
/// Blend directions are kept flattened to `[nr_verts * 3, nr_components]`
/// so a blend is a single matrix-vector product.
#[derive(Clone, Debug)]
pub struct SmplModel {
    pub gender: Gender,
    pub verts_template: nd::Array2<f32>,
    pub shape_dirs: nd::Array2<f32>,
    pub pose_dirs: nd::Array2<f32>,
    pub joint_regressor: nd::Array2<f32>,
    pub lbs_weights: nd::Array2<f32>,
    pub parent_idx_per_joint: Vec<usize>,
}

impl SmplModel {
    /// # Errors
    /// Will error if the matrices don't agree on the number of vertices and
    /// joints, or if a parent comes after its child
    #[allow(clippy::too_many_arguments)]
    pub fn new_from_matrices(
        gender: Gender,
        verts_template: nd::Array2<f32>,
        shape_dirs: &nd::Array3<f32>,
        pose_dirs: &nd::Array3<f32>,
        joint_regressor: nd::Array2<f32>,
        parent_idx_per_joint: Vec<usize>,
        lbs_weights: nd::Array2<f32>,
    ) -> Result<Self, SmplError> {
        let num_verts = verts_template.nrows();
        let num_joints = joint_regressor.nrows();
        let invalid = |msg: String| Err(SmplError::InvalidModel(msg));

        if verts_template.ncols() != 3 {
            return invalid(format!("v_template must be [nr_verts, 3], got {:?}", verts_template.dim()));
        }
        if shape_dirs.dim().0 != num_verts || shape_dirs.dim().1 != 3 {
            return invalid(format!("shapedirs must be [{num_verts}, 3, nr_betas], got {:?}", shape_dirs.dim()));
        }
        if pose_dirs.dim() != (num_verts, 3, 9 * num_joints.saturating_sub(1)) {
            return invalid(format!(
                "posedirs must be [{num_verts}, 3, {}], got {:?}",
                9 * num_joints.saturating_sub(1),
                pose_dirs.dim()
            ));
        }
        if joint_regressor.ncols() != num_verts {
            return invalid(format!("J_regressor must be [nr_joints, {num_verts}], got {:?}", joint_regressor.dim()));
        }
        if lbs_weights.dim() != (num_verts, num_joints) {
            return invalid(format!("weights must be [{num_verts}, {num_joints}], got {:?}", lbs_weights.dim()));
        }
        if parent_idx_per_joint.len() != num_joints {
            return invalid(format!("kintree_table lists {} joints, expected {num_joints}", parent_idx_per_joint.len()));
        }
        if let Some((joint, parent)) = parent_idx_per_joint
            .iter()
            .enumerate()
            .skip(1)
            .find(|&(joint, &parent)| parent >= joint)
        {
            return invalid(format!("joint {joint} has parent {parent}, parents must precede their children"));
        }

        let num_betas = shape_dirs.dim().2;
        let shape_dirs = shape_dirs.as_standard_layout().into_owned().into_shape_with_order((num_verts * 3, num_betas))?;
        let num_pose_blend = pose_dirs.dim().2;
        let pose_dirs = pose_dirs.as_standard_layout().into_owned().into_shape_with_order((num_verts * 3, num_pose_blend))?;

        debug!("SMPL model with {num_verts} verts, {num_joints} joints and {num_betas} betas");

        Ok(Self {
            gender,
            verts_template,
            shape_dirs,
            pose_dirs,
            joint_regressor,
            lbs_weights,
            parent_idx_per_joint,
        })
    }

    /// Loads the standard SMPL arrays: `v_template`, `shapedirs`, `posedirs`,
    /// `J_regressor`, `weights` and `kintree_table`
    ///
    /// # Errors
    /// Will error if an array is missing, not numeric or has the wrong shape
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn new_from_arrays<M: ModelArrays>(arrays: &mut M, gender: Gender) -> Result<Self, SmplError> {
        let verts_template: nd::Array2<f32> = arrays.read_f32_dim("v_template")?;
        let shape_dirs: nd::Array3<f32> = arrays.read_f32_dim("shapedirs")?;
        let pose_dirs: nd::Array3<f32> = arrays.read_f32_dim("posedirs")?;
        let joint_regressor: nd::Array2<f32> = arrays.read_f32_dim("J_regressor")?;
        let lbs_weights: nd::Array2<f32> = arrays.read_f32_dim("weights")?;
        let kintree_table: nd::Array2<f32> = arrays.read_f32_dim("kintree_table")?;

        // row 0 holds the parents, the root has an invalid parent (-1 or u32::MAX)
        let parent_idx_per_joint: Vec<usize> = kintree_table
            .row(0)
            .iter()
            .enumerate()
            .map(|(joint, &parent)| if joint == 0 || parent < 0.0 { 0 } else { parent as usize })
            .collect();

        Self::new_from_matrices(
            gender,
            verts_template,
            &shape_dirs,
            &pose_dirs,
            joint_regressor,
            parent_idx_per_joint,
            lbs_weights,
        )
    }

    /// # Errors
    /// Will error if the path cannot be opened or the arrays are invalid
    pub fn new_from_npz<P: AsRef<Path>>(model_path: P, gender: Gender) -> Result<Self, SmplError> {
        let mut arrays = NpzModelArrays::open(model_path.as_ref())?;
        let model = Self::new_from_arrays(&mut arrays, gender)?;
        info!("SMPL model loaded: {}", model_path.as_ref().display());
        Ok(model)
    }

    /// Loads a model converted to json by `smpl2json`
    ///
    /// # Errors
    /// Will error if the path cannot be opened or the arrays are invalid
    pub fn new_from_json<P: AsRef<Path>>(model_path: P, gender: Gender) -> Result<Self, SmplError> {
        let mut arrays = JsonModelArrays::open(model_path.as_ref())?;
        let model = Self::new_from_arrays(&mut arrays, gender)?;
        info!("SMPL model loaded: {}", model_path.as_ref().display());
        Ok(model)
    }

    /// Picks the loader from the file extension
    ///
    /// # Errors
    /// Will error for pickles and unknown extensions, and whenever the
    /// chosen loader fails
    pub fn new_from_file<P: AsRef<Path>>(model_path: P, gender: Gender) -> Result<Self, SmplError> {
        let model_path = model_path.as_ref();
        match FileType::from_path(model_path) {
            FileType::Npz => Self::new_from_npz(model_path, gender),
            FileType::Json => Self::new_from_json(model_path, gender),
            FileType::Pkl => Err(SmplError::UnsupportedFile {
                path: model_path.to_path_buf(),
                reason: "pickled models must be converted with smpl2json first".to_string(),
            }),
            FileType::Txt | FileType::Unknown => Err(SmplError::UnsupportedFile {
                path: model_path.to_path_buf(),
                reason: "expected an .npz or .json model".to_string(),
            }),
        }
    }

    pub fn num_verts(&self) -> usize {
        self.verts_template.nrows()
    }
    pub fn num_joints(&self) -> usize {
        self.joint_regressor.nrows()
    }
    pub fn num_betas(&self) -> usize {
        self.shape_dirs.ncols()
    }

    /// Template plus shape blend, using at most as many betas as the model has
    ///
    /// # Errors
    /// Only on internal shape errors
    pub fn betas2verts(&self, betas: &Betas) -> Result<nd::Array2<f32>, SmplError> {
        let nr_betas = betas.len().min(self.num_betas());
        let offsets = self
            .shape_dirs
            .slice(s![.., 0..nr_betas])
            .dot(&betas.betas.slice(s![0..nr_betas]))
            .into_shape_with_order((self.num_verts(), 3))?;
        Ok(&self.verts_template + &offsets)
    }

    pub fn verts2joints(&self, verts_t_pose: &nd::Array2<f32>) -> nd::Array2<f32> {
        self.joint_regressor.dot(verts_t_pose)
    }

    /// Flattened `R - I` for every non-root joint
    pub fn compute_pose_feature(rot_mats: &nd::Array3<f32>) -> nd::Array1<f32> {
        let identity = nd::Array2::<f32>::eye(3);
        let mut feature = Vec::with_capacity(rot_mats.len_of(Axis(0)).saturating_sub(1) * 9);
        for rot in rot_mats.outer_iter().skip(1) {
            feature.extend((&rot - &identity).iter());
        }
        nd::Array1::from_vec(feature)
    }

    /// # Errors
    /// Only on internal shape errors
    pub fn compute_pose_correctives(&self, rot_mats: &nd::Array3<f32>) -> Result<nd::Array2<f32>, SmplError> {
        let pose_feature = Self::compute_pose_feature(rot_mats);
        Ok(self.pose_dirs.dot(&pose_feature).into_shape_with_order((self.num_verts(), 3))?)
    }

    /// Linear blend skinning of `verts_posed` with the rotations in
    /// `rot_mats`. Returns the skinned vertices and the posed joints.
    ///
    /// # Errors
    /// Only on internal shape errors
    pub fn apply_pose(
        &self,
        verts_posed: &nd::Array2<f32>,
        joints: &nd::Array2<f32>,
        rot_mats: &nd::Array3<f32>,
    ) -> Result<(nd::Array2<f32>, nd::Array2<f32>), SmplError> {
        let num_joints = self.num_joints();
        let (posed_joints, rel_transforms) = batch_rigid_transform(&self.parent_idx_per_joint, rot_mats, joints);
        let rel_transforms = rel_transforms.into_shape_with_order((num_joints, 16))?;

        // per vertex 4x4 transform, row major
        let vert_transforms = self.lbs_weights.dot(&rel_transforms);
        let mut verts = nd::Array2::<f32>::zeros((self.num_verts(), 3));
        for ((mut out, v), t) in verts
            .axis_iter_mut(Axis(0))
            .zip(verts_posed.axis_iter(Axis(0)))
            .zip(vert_transforms.axis_iter(Axis(0)))
        {
            for r in 0..3 {
                out[r] = t[r * 4] * v[0] + t[r * 4 + 1] * v[1] + t[r * 4 + 2] * v[2] + t[r * 4 + 3];
            }
        }
        Ok((verts, posed_joints))
    }

    /// Shape blend, pose blend and skinning, then `transl` is added to
    /// vertices and joints
    ///
    /// # Errors
    /// Will error if the pose does not have one rotation per joint
    pub fn forward(&self, betas: &Betas, pose: &Pose, transl: &nd::Array1<f32>) -> Result<SmplOutput, SmplError> {
        if pose.num_joints() != self.num_joints() {
            return Err(SmplError::InvalidModel(format!(
                "pose has {} joints but the model has {}",
                pose.num_joints(),
                self.num_joints()
            )));
        }
        if transl.len() != 3 {
            return Err(SmplError::InvalidModel(format!("translation must have 3 components, got {}", transl.len())));
        }

        let verts_t_pose = self.betas2verts(betas)?;
        let joints = self.verts2joints(&verts_t_pose);
        let rot_mats = batch_rodrigues(&pose.joint_poses);
        let verts_posed = verts_t_pose + self.compute_pose_correctives(&rot_mats)?;
        let (mut verts, mut joints) = self.apply_pose(&verts_posed, &joints, &rot_mats)?;

        verts += &transl.view().insert_axis(Axis(0));
        joints += &transl.view().insert_axis(Axis(0));
        Ok(SmplOutput { verts, joints })
    }
}
