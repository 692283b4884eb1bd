pub mod settings;

pub use settings::{
    generate_default_config, DetectorSettings, DisplaySettings, LoggingSettings, Settings,
    SourceSettings, StreamSettings,
};
