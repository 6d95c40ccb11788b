// Quantized inner product: int8 multiply, fused post-processing
pub mod desc;
pub mod error;
pub mod gemm;
pub mod layer;
pub mod pd;
pub mod pp;
pub mod primitive;
pub mod scratchpad;
pub mod types;

pub use desc::attr::{OutputScales, PostOp, PrimitiveAttr};
pub use desc::{Format, InnerProductDesc, MemoryDesc, PropKind};
pub use error::{Error, Result, Unsupported};
pub use pd::{InnerProductPd, ScaleMode};
pub use pp::{Bias, PpConfig, PpKernel};
pub use primitive::{ExecArgs, ExecConfig, ExecEvent, InnerProduct};
pub use types::{DataType, RoundMode};
