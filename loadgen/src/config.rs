use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{error::Error, sizer::size_descriptor};

/// Scale of the `--file-size` and `--bandwidth` options (GB and GB/s).
pub(crate) const GIGABYTE: f64 = 1e9;

/// A validated description of one run.
#[derive(Debug, Clone)]
pub(crate) struct GenerationRequest {
    file_size_bytes: f64,
    bandwidth_bytes_per_sec: f64,
    file_count: usize,
    directory: PathBuf,
    host: String,
    time_budget: Duration,
}

impl GenerationRequest {
    /// Validates all fields and makes sure `directory` exists and accepts new files.
    pub(crate) fn new(
        file_size_bytes: f64,
        bandwidth_bytes_per_sec: f64,
        file_count: usize,
        directory: PathBuf,
        host: String,
    ) -> Result<Self, Error> {
        if !bandwidth_bytes_per_sec.is_finite() || bandwidth_bytes_per_sec <= 0.0 {
            return Err(Error::invalid(format!(
                "bandwidth must be finite and positive, got {} bytes/s",
                bandwidth_bytes_per_sec
            )));
        }
        // rejects negative sizes and buffers that can't be allocated
        size_descriptor(file_size_bytes)?;
        if file_count == 0 {
            return Err(Error::invalid("number of files must be at least 1"));
        }
        if host.is_empty() || host.contains(std::path::is_separator) {
            return Err(Error::invalid(format!(
                "host identifier {:?} can't be embedded in a file name",
                host
            )));
        }
        let time_budget = time_budget(file_size_bytes, bandwidth_bytes_per_sec)?;
        ensure_writable(&directory)?;
        Ok(Self {
            file_size_bytes,
            bandwidth_bytes_per_sec,
            file_count,
            directory,
            host,
            time_budget,
        })
    }

    pub(crate) fn from_gigabytes(
        file_size_gb: f64,
        bandwidth_gb_per_sec: f64,
        file_count: usize,
        directory: PathBuf,
        host: String,
    ) -> Result<Self, Error> {
        Self::new(
            file_size_gb * GIGABYTE,
            bandwidth_gb_per_sec * GIGABYTE,
            file_count,
            directory,
            host,
        )
    }

    pub(crate) fn file_size_bytes(&self) -> f64 {
        self.file_size_bytes
    }

    pub(crate) fn bandwidth_bytes_per_sec(&self) -> f64 {
        self.bandwidth_bytes_per_sec
    }

    pub(crate) fn file_count(&self) -> usize {
        self.file_count
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.directory
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    /// Time a single file is expected to take: file size over the aggregate bandwidth.
    ///
    /// The budget is not divided by the number of concurrently running files.
    pub(crate) fn time_budget(&self) -> Duration {
        self.time_budget
    }
}

fn time_budget(file_size_bytes: f64, bandwidth_bytes_per_sec: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(file_size_bytes / bandwidth_bytes_per_sec).map_err(|err| {
        Error::invalid(format!(
            "time budget for {} bytes at {} bytes/s is not representable: {}",
            file_size_bytes, bandwidth_bytes_per_sec, err
        ))
    })
}

fn ensure_writable(dir: &Path) -> Result<(), Error> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|err| Error::invalid(format!("creating output directory {}: {}", dir.display(), err)))?;
    }
    if !dir.is_dir() {
        return Err(Error::invalid(format!("{} is not a directory", dir.display())));
    }
    // unnamed file, nothing is left behind even if the process dies
    tempfile::tempfile_in(dir)
        .map_err(|err| Error::invalid(format!("output directory {} is not writable: {}", dir.display(), err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn request(size: f64, bandwidth: f64, count: usize, dir: &Path) -> Result<GenerationRequest, Error> {
        GenerationRequest::from_gigabytes(size, bandwidth, count, dir.to_owned(), "host".into())
    }

    #[test]
    fn converts_gigabytes_and_computes_budget() {
        let dir = tempdir().unwrap();
        let request = request(2.0, 0.5, 3, dir.path()).unwrap();
        assert_eq!(request.file_size_bytes(), 2e9);
        assert_eq!(request.bandwidth_bytes_per_sec(), 5e8);
        assert_eq!(request.file_count(), 3);
        assert_eq!(request.time_budget(), Duration::from_secs(4));
    }

    #[test]
    fn zero_file_size_has_zero_budget() {
        let dir = tempdir().unwrap();
        assert_eq!(request(0.0, 1.0, 2, dir.path()).unwrap().time_budget(), Duration::ZERO);
    }

    #[test]
    fn rejects_invalid_numbers() {
        let dir = tempdir().unwrap();
        for (size, bandwidth, count) in [
            (1.0, 0.0, 1),
            (1.0, -0.5, 1),
            (1.0, f64::NAN, 1),
            (-1.0, 1.0, 1),
            (f64::INFINITY, 1.0, 1),
            (1.0, 1.0, 0),
            (1.0, 1e-300, 1),
            (1e10, 1.0, 1),
        ] {
            assert!(
                matches!(request(size, bandwidth, count, dir.path()), Err(Error::InvalidConfiguration(_))),
                "size={} bandwidth={} count={} must be rejected",
                size,
                bandwidth,
                count
            );
        }
    }

    #[test]
    fn infinite_bandwidth_is_reported_as_not_finite() {
        let dir = tempdir().unwrap();
        match request(1.0, f64::INFINITY, 1, dir.path()) {
            Err(Error::InvalidConfiguration(reason)) => {
                assert!(reason.contains("finite and positive"), "{}", reason)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn rejects_hosts_that_break_file_names() {
        let dir = tempdir().unwrap();
        for host in ["", "a/b"] {
            let rst = GenerationRequest::new(8.0, 1.0, 1, dir.path().to_owned(), host.into());
            assert!(matches!(rst, Err(Error::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn creates_missing_directory_and_leaves_no_probe() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        request(1.0, 1.0, 1, &nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[test]
    fn stale_files_do_not_make_directory_unwritable() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(format!(".loadgen-probe-{}", std::process::id())), b"").unwrap();
        assert!(request(1.0, 1.0, 1, dir.path()).is_ok());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn rejects_file_as_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            request(1.0, 1.0, 1, &file),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
