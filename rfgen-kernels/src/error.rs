use thiserror::Error;

/// Coarse classification of an [`RfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A host or device scratch buffer could not be allocated.
    Allocation,
    /// Worker threads or a device kernel could not be started or finished.
    Launch,
    /// Shapes, lengths or parameters rejected at the boundary.
    Precondition,
    /// Any other device runtime failure.
    Device,
}

#[derive(Error, Debug)]
pub enum RfError {
    #[error("failed to allocate scratch buffer of {elements} elements")]
    Allocation { elements: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("dimension mismatch in {context}: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("array '{0}' is not contiguous in standard layout")]
    NonContiguous(String),

    #[error("cuda kernel compilation failed: {0}")]
    KernelCompile(String),

    #[error("cuda kernel launch failed: {0}")]
    KernelLaunch(String),

    #[cfg(feature = "cuda")]
    #[error("cuda driver error: {0}")]
    Driver(#[from] cudarc::driver::DriverError),
}

impl RfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RfError::Allocation { .. } => ErrorKind::Allocation,
            RfError::ThreadPool(_) | RfError::WorkerPanicked(_) | RfError::KernelLaunch(_) => {
                ErrorKind::Launch
            }
            RfError::DimensionMismatch { .. }
            | RfError::InvalidParameter { .. }
            | RfError::NonContiguous(_) => ErrorKind::Precondition,
            RfError::KernelCompile(_) => ErrorKind::Device,
            #[cfg(feature = "cuda")]
            RfError::Driver(_) => ErrorKind::Device,
        }
    }

    pub(crate) fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        RfError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mismatch(context: &str, expected: &[usize], got: &[usize]) -> Self {
        RfError::DimensionMismatch {
            context: context.to_string(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RfError>;

/// Allocates a zero-filled scratch buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed<T: Copy>(len: usize, zero: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RfError::Allocation { elements: len })?;
    buffer.resize(len, zero);
    Ok(buffer)
}
