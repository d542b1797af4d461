use ndarray as nd;

/// Result of a forward pass, translation already applied
#[derive(Clone, Debug)]
pub struct SmplOutput {
    pub verts: nd::Array2<f32>,
    pub joints: nd::Array2<f32>,
}
impl SmplOutput {
    pub fn num_verts(&self) -> usize {
        self.verts.nrows()
    }
    pub fn num_joints(&self) -> usize {
        self.joints.nrows()
    }
}
