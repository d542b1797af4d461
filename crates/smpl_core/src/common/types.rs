use log::warn;
use std::path::Path;
use strum_macros::{Display, EnumString};

/// Offset of the gender letter in the legacy SMPL release file names, e.g.
/// `basicModel_f_lbs_10_207_0_v1.0.0.pkl`
pub const GENDER_CHAR_OFFSET: usize = 11;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Gender {
    #[default]
    Neutral = 0,
    Male,
    Female,
}
impl Gender {
    /// Infers the gender from the character at [`GENDER_CHAR_OFFSET`] of the
    /// file name: `f` is female, `m` is male, anything else is neutral.
    ///
    /// This only works for the legacy release naming scheme, a renamed file
    /// silently falls back to neutral (logged as a warning).
    pub fn from_model_filename<P: AsRef<Path>>(path: P) -> Self {
        let file_name = path.as_ref().file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        match file_name.chars().nth(GENDER_CHAR_OFFSET) {
            Some('f') => Gender::Female,
            Some('m') => Gender::Male,
            _ => {
                warn!("Could not infer gender from file name `{file_name}`, using neutral");
                Gender::Neutral
            }
        }
    }

    /// Upper case name used in converted model file names
    pub fn file_tag(&self) -> String {
        self.to_string().to_uppercase()
    }
}
