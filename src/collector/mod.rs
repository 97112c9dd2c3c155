mod cpu;
mod memory;
mod sampler;
mod types;

pub use memory::recent_pause_index;
pub use sampler::{Collector, CollectorError, CollectorHandle, Consumer};
pub use types::{narrow, FieldValue, Fields, FieldsError};
