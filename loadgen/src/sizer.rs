use std::mem;

use crate::error::Error;

/// Width in bytes of one generated element. Datasets hold `f64` values.
pub(crate) const ELEMENT_WIDTH: usize = mem::size_of::<f64>();

/// Largest element count a single buffer can hold, allocations are capped at `isize::MAX` bytes.
pub(crate) const MAX_ELEMENTS: usize = isize::MAX as usize / ELEMENT_WIDTH;

/// Shape of the one-dimensional buffer generated for a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeDescriptor {
    elements: u64,
}

impl SizeDescriptor {
    pub(crate) fn elements(&self) -> u64 {
        self.elements
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.elements * ELEMENT_WIDTH as u64
    }

    /// Element count as a buffer length. Fails if the buffer can't be allocated on this platform.
    pub(crate) fn len(&self) -> Result<usize, Error> {
        usize::try_from(self.elements)
            .ok()
            .filter(|len| *len <= MAX_ELEMENTS)
            .ok_or_else(|| Error::invalid(format!("{} elements do not fit in memory", self.elements)))
    }
}

pub(crate) fn size_descriptor(target_bytes: f64) -> Result<SizeDescriptor, Error> {
    if !target_bytes.is_finite() || target_bytes < 0.0 {
        return Err(Error::invalid(format!(
            "file size must be a finite non-negative number of bytes, got {}",
            target_bytes
        )));
    }
    let elements = (target_bytes / ELEMENT_WIDTH as f64).floor();
    if elements >= u64::MAX as f64 {
        return Err(Error::invalid(format!("file size of {} bytes is too large", target_bytes)));
    }
    let descriptor = SizeDescriptor {
        elements: elements as u64,
    };
    descriptor.len()?;
    Ok(descriptor)
}
