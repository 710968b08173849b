//! Encoder configuration and screen geometry registry

mod registry;

pub use registry::{
    ConfigRegistry, ConfigSnapshot, ConfigUpdate, EncoderConfig, ScreenState, TargetMode,
    MAX_SCREEN_HEIGHT, MAX_SCREEN_WIDTH, MIN_SCREEN_HEIGHT, MIN_SCREEN_WIDTH,
};
