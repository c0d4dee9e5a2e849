mod backend;
mod hosted;
mod result;

pub use backend::DetectionService;
pub use hosted::{HostedInferenceClient, InferenceSettings, DEFAULT_ENDPOINT};
pub use result::{BoxRect, Detection};
