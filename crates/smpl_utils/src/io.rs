use std::{fs::File, path::Path};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

pub struct FileLoader {}
impl FileLoader {
    /// Opens a file for reading, returning the io error untouched so callers
    /// can attach the path
    pub fn open<P: AsRef<Path>>(file_path: P) -> std::io::Result<File> {
        File::open(file_path)
    }
}

/// associating a extension with a enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum FileType {
    Npz,
    Json,
    Pkl,
    Txt,
    Unknown,
}
impl FileType {
    pub fn value(&self) -> &'static [&'static str] {
        match self {
            Self::Npz => &["npz"],
            Self::Json => &["json"],
            Self::Pkl => &["pkl", "pickle"],
            Self::Txt => &["txt", "xyz"],
            Self::Unknown => &[""],
        }
    }
    pub fn find_match(ext: &str) -> Self {
        Self::iter()
            .find(|filetype| filetype.value().contains(&(ext.to_lowercase()).as_str()))
            .unwrap_or(FileType::Unknown)
    }
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(FileType::Unknown, Self::find_match)
    }
}
