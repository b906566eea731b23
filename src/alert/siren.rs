// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Siren on the default audio output device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::Siren;
use crate::config::FeedbackConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
struct SweepParams {
    high_hz: f32,
    low_hz: f32,
    sweep_secs: f32,
    gain: f32,
}

struct OutputThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Sawtooth tone falling exponentially from the high to the low pitch over
/// one sweep, then holding the low pitch until retriggered.
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread for as long as the siren runs. `start` and `stop` never
/// wait on that thread; a device that fails to open is logged from it.
pub struct CpalSiren {
    params: SweepParams,
    retrigger: Arc<AtomicBool>,
    output: Mutex<Option<OutputThread>>,
}

impl CpalSiren {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            params: SweepParams {
                high_hz: config.siren_high_hz,
                low_hz: config.siren_low_hz,
                sweep_secs: config.siren_sweep_ms as f32 / 1000.0,
                gain: config.siren_gain.clamp(0.0, 1.0),
            },
            retrigger: Arc::new(AtomicBool::new(false)),
            output: Mutex::new(None),
        }
    }
}

fn open_stream(params: SweepParams, retrigger: Arc<AtomicBool>) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no output device".to_string())?;
    let supported = device.default_output_config().map_err(|e| e.to_string())?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(format!("unsupported sample format {:?}", supported.sample_format()));
    }

    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0 as f32;
    let channels = config.channels as usize;

    let mut elapsed = 0.0f32;
    let mut phase = 0.0f32;
    let ratio = params.low_hz / params.high_hz;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if retrigger.swap(false, Ordering::Relaxed) {
                    elapsed = 0.0;
                }
                for frame in data.chunks_mut(channels) {
                    let progress = (elapsed / params.sweep_secs).min(1.0);
                    let freq = params.high_hz * ratio.powf(progress);
                    phase = (phase + freq / sample_rate).fract();
                    let value = (2.0 * phase - 1.0) * params.gain;
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                    elapsed += 1.0 / sample_rate;
                }
            },
            |e| warn!("Siren stream error: {}", e),
            None,
        )
        .map_err(|e| e.to_string())?;

    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

impl Siren for CpalSiren {
    fn start(&self) -> Result<()> {
        let mut output = self.output.lock();
        if output.as_ref().map_or(false, |t| !t.handle.is_finished()) {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let params = self.params.clone();
        let retrigger = self.retrigger.clone();

        let handle = std::thread::Builder::new()
            .name("siren".to_string())
            .spawn(move || match open_stream(params, retrigger) {
                Ok(stream) => {
                    info!("Siren playing on default output device");
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => warn!("Audio alarm unavailable: {}", e),
            })?;

        *output = Some(OutputThread { stop_tx, handle });
        Ok(())
    }

    fn retrigger(&self) -> Result<()> {
        self.retrigger.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Signal the output thread and return; the thread closes the stream
    fn stop(&self) {
        if let Some(thread) = self.output.lock().take() {
            let _ = thread.stop_tx.send(());
        }
    }
}

impl Drop for CpalSiren {
    fn drop(&mut self) {
        self.stop();
    }
}
