pub mod error;
pub mod id;
pub mod network;
pub mod ops;
pub mod tensor;

// Re-export commonly used types
pub use error::CoreError;
pub use id::{OperandRef, OperationId};
pub use network::{Network, Operation};
pub use ops::{
    BiasData, ConvInfo, FullyConnectedInfo, OperationKind, Padding, PoolingInfo, PoolingType,
    ReluBounds, Stride, WeightsData,
};
pub use tensor::{
    div_round_up, round_up_to_multiple, shape_volume, DataFormat, DataType, QuantizationInfo,
    TensorInfo, TensorShape,
};
