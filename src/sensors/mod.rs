//! Sensor module - motion sources and crash detection

mod traits;
mod sampler;
mod simulator;
mod replay;

pub use traits::{MotionSample, MotionSource, Permission, RawMotion};
pub use sampler::{CrashCallback, ImpactDetector, MotionSampler, SamplerStatus, DEFAULT_THRESHOLD};
pub use simulator::SimulatedMotionSource;
pub use replay::ReplayMotionSource;
