mod adapter;
mod backends;
mod result;

pub use adapter::{AdapterSettings, DetectorAdapter};
pub use backends::{StubAdapter, StubStep};
#[cfg(feature = "backend-tract")]
pub use backends::TractAdapter;
pub use result::{Detection, ModelResult, NormBox, PixelBox};
