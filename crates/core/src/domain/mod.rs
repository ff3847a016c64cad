//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod equalizer;
pub mod params;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioDevice, AudioEnumerator, AudioError, ChannelCount, DeviceId, DeviceInfo, ProcessSpec,
    SampleRate, StreamConfig,
};
pub use config::{
    AppConfig, ConfigError, ConfigManager, ConfigWatcher, OutputConfig, SignalKind, SixbandConfig,
};
pub use dsp::{
    butterworth, db_to_gain, gain_to_db, BiquadCoeffs, BiquadFilter, CutBank, CutCoeffs, Effect,
    PassType, Slope,
};
pub use equalizer::{ChainCoefficients, ChainPosition, ChannelProcessor, MonoChain, ParametricEq};
pub use params::{
    AtomicParameterStore, BandSettings, ChainSettings, CutSettings, ParamError, ParamId,
    ParamRange, ParameterStore,
};
