pub mod config;
pub mod records;
pub mod trend;

pub use config::DaemonConfig;
pub use records::{
    DeviceRecord, DeviceUpdate, NewDevice, NewTagSet, TagSetRecord, TagSetUpdate,
};
pub use trend::{
    validate_params, JobSnapshot, Sample, SampleEvent, TagValue, TrendParams, TrendState,
};
