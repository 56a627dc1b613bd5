pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod plotting;
pub mod psu;
pub mod recorder;
pub mod scope;
pub mod storage;
pub mod types;
pub mod utils;

pub use cancel::CancellationToken;
pub use crate::config::{load_config, AppConfig, LoggingConfig, PsuConfig, Rotation, ScopeConfig};
pub use error::LabError;
pub use logging::{init_logging, RotatingFileWriter};
pub use plotting::{plot_series, plot_trace, plot_values};
pub use psu::{PlaceholderSupply, PowerSupply};
pub use recorder::{RecorderState, SamplingRecorder};
pub use scope::{
    discover_devices, flash_led, record_trace, Oscilloscope, SimulatedScope, TraceSettings,
};
pub use storage::{load_series, load_trace, save_series, save_trace};
pub use types::{
    parse_period, Channel, ChannelSetup, Coupling, Reading, RecordBound, Sample, Series, Trace,
    SERIES_FORMAT_VERSION,
};
