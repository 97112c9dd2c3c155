mod collector;
mod config;
mod runtime;

pub use collector::{
    narrow, recent_pause_index, Collector, CollectorError, CollectorHandle, Consumer, FieldValue,
    Fields, FieldsError,
};
pub use config::{
    CollectorConfig, ConfigError, DEFAULT_INTERVAL, ENV_ENABLE_CPU, ENV_ENABLE_GC,
    ENV_ENABLE_MEMORY, ENV_INTERVAL_MS,
};
pub use runtime::{
    foreign_call_count, record_foreign_call, AllocCounters, CountingAlloc, MemStats,
    ProcessSource, RuntimeSource, TokioTaskSource, PAUSE_HISTORY_LEN,
};
