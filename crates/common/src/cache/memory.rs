//! Sizing the cache budget against the host's physical memory.

/// Fraction of physical memory used when no budget is configured.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.15;

/// Source of the host's total physical memory.
pub trait SystemMemory: Send + Sync {
    fn total_bytes(&self) -> Option<u64>;
}

/// Queries the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostMemory;

impl SystemMemory for HostMemory {
    #[cfg(unix)]
    fn total_bytes(&self) -> Option<u64> {
        // SAFETY: sysconf has no preconditions and only reads system constants
        let (pages, page_size) = unsafe {
            (
                libc::sysconf(libc::_SC_PHYS_PAGES),
                libc::sysconf(libc::_SC_PAGESIZE),
            )
        };
        if pages <= 0 || page_size <= 0 {
            return None;
        }
        (pages as u64).checked_mul(page_size as u64)
    }

    #[cfg(not(unix))]
    fn total_bytes(&self) -> Option<u64> {
        None
    }
}

/// A fixed amount of memory, for tests and for hosts where the
/// operating system cannot be asked.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl SystemMemory for FixedMemory {
    fn total_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CacheSizeError {
    #[error("available_bytes must be a finite, non-negative number, got {0}")]
    Invalid(f64),
    #[error("available_bytes was given as a fraction of memory, but total physical memory is unknown")]
    MemoryUnknown,
}

/// Cache budget as written in configuration.
///
/// Values in the open interval (0, 1) are a fraction of total physical
/// memory; anything else is an absolute byte count. `0` disables caching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AvailableBytes {
    Absolute(usize),
    Fraction(f64),
}

impl Default for AvailableBytes {
    fn default() -> Self {
        AvailableBytes::Fraction(DEFAULT_MEMORY_FRACTION)
    }
}

impl AvailableBytes {
    pub fn from_value(value: f64) -> Result<Self, CacheSizeError> {
        if !value.is_finite() || value < 0.0 {
            return Err(CacheSizeError::Invalid(value));
        }
        if value > 0.0 && value < 1.0 {
            Ok(AvailableBytes::Fraction(value))
        } else {
            Ok(AvailableBytes::Absolute(value.floor() as usize))
        }
    }

    pub fn resolve(self, memory: &dyn SystemMemory) -> Result<usize, CacheSizeError> {
        match self {
            AvailableBytes::Absolute(bytes) => Ok(bytes),
            AvailableBytes::Fraction(fraction) => {
                let total = memory.total_bytes().ok_or(CacheSizeError::MemoryUnknown)?;
                Ok((total as f64 * fraction).floor() as usize)
            }
        }
    }
}
