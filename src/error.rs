use crate::desc::{Format, PropKind, TensorRole};
use crate::types::DataType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a descriptor/attribute combination is rejected by this implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Unsupported {
    #[error("propagation kind {0:?}")]
    PropKind(PropKind),

    #[error("{tensor} data type {data_type:?}")]
    DataType { tensor: TensorRole, data_type: DataType },

    /// Rank outside the supported range (2..=5 for src/weights).
    #[error("{tensor} rank {ndims}")]
    Rank { tensor: TensorRole, ndims: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("{0} has a zero-sized dimension")]
    ZeroDim(TensorRole),

    #[error("{0} post-ops (at most one)")]
    PostOpCount(usize),

    #[error("post-op is not a unit-scale relu with zero intercept")]
    PostOpKind,

    #[error("output scales mask {mask} with {count} values")]
    OutputScales { mask: u32, count: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unsupported configuration: {0}")]
    Unsupported(#[from] Unsupported),

    #[error("invalid layout for {tensor}: {format:?}")]
    InvalidLayout { tensor: TensorRole, format: Format },

    #[error("buffer {arg} holds {actual} elements, expected {expected}")]
    BufferSize { arg: &'static str, expected: usize, actual: usize },

    #[error("bias buffer is {actual:?}, primitive was built for {expected:?}")]
    BiasDataType { expected: Option<DataType>, actual: Option<DataType> },
}

impl Error {
    /// True for every configuration-time rejection.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_) | Error::InvalidLayout { .. })
    }
}
