//! CPU-side SMPL model loading, skinning, format conversion and the
//! numeric checks used to validate those outputs.
pub mod error;
pub use error::SmplError;

pub mod common {
    pub mod betas;
    pub mod outputs;
    pub mod pose;
    pub mod smpl_model;
    pub mod types;
}
pub mod codec {
    pub mod model_file;
    pub mod pickle;
    pub mod py_objects;
    pub mod vertex_table;
}
pub mod conversions {
    pub mod model2json;
}
pub mod metrics {
    pub mod chamfer;
    pub mod vertex_compare;
}
