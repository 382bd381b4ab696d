use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime},
};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, info, instrument};

use crate::{
    dataset::{Compression, DatasetWriter},
    error::{BoxError, Error},
    sizer::SizeDescriptor,
};

// the number of leading values logged at debug level for every generated buffer
const PREVIEW_VALUES: usize = 4;

/// Fills the buffer that becomes a file's dataset.
pub(crate) trait RandomFill: Send + Sync {
    fn fill(&self, buf: &mut [f64]);
}

/// Uniform values in [0, 1), with a fresh generator seeded from OS entropy for every buffer.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct UniformFill;

impl RandomFill for UniformFill {
    fn fill(&self, buf: &mut [f64]) {
        let mut rng = SmallRng::from_entropy();
        for value in buf.iter_mut() {
            *value = rng.gen();
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WriterOptions {
    pub compression: Compression,
    pub rows_per_group: usize,
    pub fsync: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: Compression::UNCOMPRESSED,
            rows_per_group: 1 << 20,
            fsync: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskOutcome {
    pub file_name: String,
    pub path: PathBuf,
    pub elements: u64,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub(crate) fn bytes(&self) -> u64 {
        self.elements * crate::sizer::ELEMENT_WIDTH as u64
    }
}

pub(crate) struct Materializer<R: RandomFill> {
    fill: R,
    options: WriterOptions,
}

impl<R: RandomFill> Materializer<R> {
    pub(crate) fn new(fill: R, options: WriterOptions) -> Self {
        Self { fill, options }
    }

    /// Generates one buffer and persists it as a single dataset at `path`.
    ///
    /// Nothing is retried. A failed write may leave a partial file behind.
    #[instrument(skip_all, fields(file = file_name))]
    pub(crate) fn materialize(&self, file_name: &str, path: &Path, size: SizeDescriptor) -> Result<TaskOutcome, Error> {
        let len = size.len()?;
        let started_at = SystemTime::now();
        let start = Instant::now();
        info!("start time: {}", humantime::format_rfc3339_millis(started_at));

        let write_failure = |source: BoxError| Error::WriteFailure {
            file_name: file_name.to_owned(),
            path: path.to_owned(),
            source,
        };
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|err| write_failure(err.into()))?;
        data.resize(len, 0f64);
        self.fill.fill(&mut data);
        debug!("data: {:?}", &data[..len.min(PREVIEW_VALUES)]);

        self.persist(path, &data).map_err(write_failure)?;

        let elapsed = start.elapsed();
        let finished_at = SystemTime::now();
        info!(
            "end time: {}, elapsed {:.3}s",
            humantime::format_rfc3339_millis(finished_at),
            elapsed.as_secs_f64()
        );
        Ok(TaskOutcome {
            file_name: file_name.to_owned(),
            path: path.to_owned(),
            elements: size.elements(),
            started_at,
            finished_at,
            elapsed,
        })
    }

    // the file handle lives in this scope and is closed on every return path
    fn persist(&self, path: &Path, data: &[f64]) -> Result<(), BoxError> {
        let file = File::create(path)?;
        let mut writer = DatasetWriter::with_compression(&file, self.options.compression, self.options.rows_per_group)?;
        writer.write(data)?;
        writer.close()?;
        if self.options.fsync {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{dataset::tests::read_dataset, sizer::size_descriptor};

    struct ConstantFill(f64);

    impl RandomFill for ConstantFill {
        fn fill(&self, buf: &mut [f64]) {
            buf.fill(self.0);
        }
    }

    #[test]
    fn uniform_fill_stays_in_unit_interval() {
        let mut buf = vec![-1.0; 4096];
        UniformFill.fill(&mut buf);
        assert!(buf.iter().all(|v| (0.0..1.0).contains(v)));
        assert!(buf.iter().any(|v| *v != buf[0]));
    }

    #[test]
    fn writes_requested_number_of_elements() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large_hdf5_file_test_1.h5");
        let materializer = Materializer::new(
            ConstantFill(0.25),
            WriterOptions {
                rows_per_group: 100,
                fsync: true,
                ..WriterOptions::default()
            },
        );

        let outcome = materializer
            .materialize("large_hdf5_file_test_1.h5", &path, size_descriptor(8000.0).unwrap())
            .unwrap();

        assert_eq!(outcome.elements, 1000);
        assert_eq!(outcome.bytes(), 8000);
        assert_eq!(outcome.path, path);
        assert!(outcome.finished_at >= outcome.started_at);
        let values = read_dataset(&path);
        assert_eq!(values.len(), 1000);
        assert!(values.iter().all(|v| *v == 0.25));
    }

    #[test]
    fn empty_payload_produces_empty_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.h5");
        let materializer = Materializer::new(UniformFill, WriterOptions::default());

        let outcome = materializer
            .materialize("empty.h5", &path, size_descriptor(0.0).unwrap())
            .unwrap();

        assert_eq!(outcome.elements, 0);
        assert!(read_dataset(&path).is_empty());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn failed_allocation_is_a_write_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.h5");
        let materializer = Materializer::new(UniformFill, WriterOptions::default());

        // passes size validation, but no allocator hands out 9 exabytes
        let err = materializer
            .materialize("huge.h5", &path, size_descriptor(9e18).unwrap())
            .unwrap_err();

        assert!(matches!(err, Error::WriteFailure { ref file_name, .. } if file_name == "huge.h5"));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_path_is_a_write_failure() {
        let dir = tempdir().unwrap();
        // a directory in place of the file can't be opened for writing, even by root
        let path = dir.path().join("occupied.h5");
        fs::create_dir(&path).unwrap();
        let materializer = Materializer::new(UniformFill, WriterOptions::default());

        let err = materializer
            .materialize("occupied.h5", &path, size_descriptor(64.0).unwrap())
            .unwrap_err();

        match err {
            Error::WriteFailure { file_name, path: failed, .. } => {
                assert_eq!(file_name, "occupied.h5");
                assert_eq!(failed, path);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
