use ndarray as nd;

/// Component for Smpl Betas or Shape Parameters
#[derive(Clone, Debug)]
pub struct Betas {
    pub betas: nd::Array1<f32>,
}
impl Default for Betas {
    fn default() -> Self {
        let num_betas = 10;
        let betas = ndarray::Array1::<f32>::zeros(num_betas);
        Self { betas }
    }
}
impl Betas {
    pub fn new(betas: nd::Array1<f32>) -> Self {
        Self { betas }
    }
    pub fn new_empty(num_betas: usize) -> Self {
        let betas = ndarray::Array1::<f32>::zeros(num_betas);
        Self { betas }
    }
    /// Every coefficient set to `value`
    pub fn new_filled(num_betas: usize, value: f32) -> Self {
        Self {
            betas: nd::Array1::from_elem(num_betas, value),
        }
    }
    pub fn len(&self) -> usize {
        self.betas.len()
    }
    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }
}
