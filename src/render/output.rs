//! Device output through cpal.
//!
//! `OutputHost::open` picks the default host and output device, builds a
//! stream in the device's native sample format, and moves a `RenderGraph`
//! into its callback. The matching `RenderToolkit` goes back to the caller,
//! whose engine drives it from the control thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tracing::{error, info};

use super::{render_pair, Frame, RenderGraph, RenderToolkit};
use crate::dsp::distortion::hard_clip;

/// Frames rendered per inner pass of the callback.
const CALLBACK_CHUNK: usize = 1024;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device available")]
    NoDevice,

    #[error("could not read the default output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("could not enumerate output devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("could not build the output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("could not start the output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format {0:?}")]
    Format(cpal::SampleFormat),
}

/// One output device as reported by the host.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Default config rendered for display, if the device reports one.
    pub default_config: Option<String>,
}

/// Keeps the cpal stream alive. Dropping it stops audio.
pub struct OutputHost {
    _stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    running: Arc<AtomicBool>,
}

impl OutputHost {
    /// Open the default output device and start streaming.
    pub fn open() -> Result<(Self, RenderToolkit), OutputError> {
        let host = cpal::default_host();
        info!(host = ?host.id(), "audio host");

        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let supported = device.default_output_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(device = %device_name, sample_rate, channels, format = ?supported.sample_format(), "audio device");

        let (mut toolkit, graph) = render_pair(sample_rate as f32);
        let config: cpal::StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, graph),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, graph),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, graph),
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, graph),
            other => return Err(OutputError::Format(other)),
        }?;

        stream.play()?;
        toolkit.set_running(true);
        info!("audio stream started at {} Hz", sample_rate);

        let running = toolkit.running_flag();
        Ok((
            Self {
                _stream: stream,
                device_name,
                sample_rate,
                channels,
                running,
            },
            toolkit,
        ))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputHost {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut graph: RenderGraph,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<Frame> = vec![[0.0; 2]; CALLBACK_CHUNK];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            write_interleaved(&mut graph, &mut scratch, data, channels);
        },
        |err| {
            let message = err.to_string();
            // Under/overruns are routine on busy machines.
            if !message.contains("underrun") && !message.contains("overrun") {
                error!("audio stream error: {}", message);
            }
        },
        None,
    )?;
    Ok(stream)
}

/// Render into an interleaved device buffer of any channel count. Mono
/// devices get the mid signal; channels past the second get silence.
pub fn write_interleaved<T>(
    graph: &mut RenderGraph,
    scratch: &mut [Frame],
    data: &mut [T],
    channels: usize,
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let channels = channels.max(1);
    for block in data.chunks_mut(scratch.len() * channels) {
        let frames = block.len() / channels;
        let rendered = &mut scratch[..frames];
        graph.process(rendered);

        for (out, frame) in block.chunks_mut(channels).zip(rendered.iter()) {
            let l = hard_clip(frame[0], 1.0, 1.0);
            let r = hard_clip(frame[1], 1.0, 1.0);
            if channels == 1 {
                out[0] = T::from_sample(0.5 * (l + r));
                continue;
            }
            for (ch, sample) in out.iter_mut().enumerate() {
                let value = match ch {
                    0 => l,
                    1 => r,
                    _ => 0.0,
                };
                *sample = T::from_sample(value);
            }
        }
    }
}

/// Every output device on the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>, OutputError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.output_devices()? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let default_config = device.default_output_config().ok().map(|c| {
            format!(
                "{} Hz, {} ch, {:?}",
                c.sample_rate().0,
                c.channels(),
                c.sample_format()
            )
        });
        devices.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            default_config,
        });
    }
    Ok(devices)
}
