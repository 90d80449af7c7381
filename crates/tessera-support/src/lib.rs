pub mod caps;
pub mod support;

// Re-export commonly used types
pub use caps::{DefaultCapabilities, HwCapabilities};
pub use support::{AlwaysSupported, BasicSupport, SupportLevel, SupportOracle};
