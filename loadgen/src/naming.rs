use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "large_hdf5_file";
const FILE_EXTENSION: &str = "h5";

// host goes first so that runs from different machines sharing one directory never collide
pub(crate) fn file_name(host: &str, index: usize) -> String {
    format!("{}_{}_{}.{}", FILE_PREFIX, host, index, FILE_EXTENSION)
}

pub(crate) fn file_path(dir: impl AsRef<Path>, host: &str, index: usize) -> PathBuf {
    dir.as_ref().join(file_name(host, index))
}
