//! Live capture from a system input device through cpal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use smallvec::SmallVec;

use crate::error::{Error, Result, ResultExt};
use crate::viz::AudioInfo;
use crate::viz::capture::frames_to_ns;
use crate::viz::settings::CaptureTarget;
use crate::viz::{AudioFrame, CaptureHandle, CaptureHost};

/// Preferred capture rate when the device supports it.
const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// [`CaptureHost`] backed by one cpal input device.
///
/// The stream is built on `connect` and dropped on `disconnect`, so a
/// released visualizer holds no device resources. The device name is the
/// source name matched against [`CaptureTarget::Source`].
pub struct CpalInputHost {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    name: String,
    stream: Option<cpal::Stream>,
}

impl std::fmt::Debug for CpalInputHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalInputHost")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

impl CpalInputHost {
    /// Open the system default input device.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::device("no input device available"))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = choose_input_config(&device, PREFERRED_SAMPLE_RATE)
            .with_context(format!("input device '{name}'"))?;
        tracing::info!(
            "Input device '{}': {} Hz, {} channel(s), {:?}",
            name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );
        Ok(Self {
            device,
            config,
            name,
            stream: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    /// Stream format a visualizer must be created with.
    pub fn info(&self) -> AudioInfo {
        AudioInfo {
            sample_rate: self.config.sample_rate().0,
            channels: usize::from(self.config.channels()),
        }
    }

    fn start(&mut self, handle: CaptureHandle) -> Result<()> {
        let config: cpal::StreamConfig = self.config.clone().into();
        let name = self.name.clone();
        let stream = match self.config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>,
            cpal::SampleFormat::I16 => build_stream::<i16>,
            cpal::SampleFormat::U16 => build_stream::<u16>,
            other => {
                return Err(Error::device(format!("unsupported sample format {other:?}")));
            }
        }(&self.device, &config, handle, name)?;
        stream
            .play()
            .map_err(|e| Error::device(format!("failed to start input stream: {e}")))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl CaptureHost for CpalInputHost {
    fn connect(&mut self, target: &CaptureTarget, handle: CaptureHandle) -> bool {
        match target {
            CaptureTarget::Source { name } if name.is_empty() || *name == self.name => {}
            CaptureTarget::Source { name } => {
                tracing::debug!("Input device '{}' does not match source '{}'", self.name, name);
                return false;
            }
            CaptureTarget::OutputBus { mix } => {
                tracing::debug!("Output bus {} is not available from an input device", mix);
                return false;
            }
        }

        self.stream = None;
        match self.start(handle) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Input stream on '{}' closed", self.name);
        }
    }
}

/// Pick a config at the preferred rate, favouring `f32` samples.
fn choose_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_input_configs()
        .map_err(|e| Error::device(format!("failed to query input configs: {e}")))?;

    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score = i32::MIN;
    for range in ranges {
        let min = range.min_sample_rate().0;
        let max = range.max_sample_rate().0;
        let rate = if (min..=max).contains(&target_rate) {
            target_rate
        } else {
            max
        };
        let cfg = range.with_sample_rate(cpal::SampleRate(rate));

        let mut score = 0;
        if cfg.sample_rate().0 == target_rate {
            score += 2;
        }
        if cfg.sample_format() == cpal::SampleFormat::F32 {
            score += 1;
        }
        if score > best_score {
            best_score = score;
            best = Some(cfg);
        }
    }
    best.ok_or_else(|| Error::device("no supported input config"))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    handle: CaptureHandle,
    source: String,
) -> Result<cpal::Stream>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels).max(1);
    let sample_rate = config.sample_rate.0;
    // Reused across callbacks
    let mut planes: Vec<Vec<f32>> = vec![Vec::new(); channels];

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for (ch, plane) in planes.iter_mut().enumerate() {
                    plane.clear();
                    plane.extend(
                        data.chunks_exact(channels)
                            .map(|frame| frame[ch].to_sample::<f32>()),
                    );
                }
                let frames = planes[0].len();
                let slices: SmallVec<[&[f32]; 2]> = planes.iter().map(Vec::as_slice).collect();
                // The buffer ends now, so its first sample is one buffer older
                let now = handle.clock().now_ns();
                let frame = AudioFrame {
                    planes: &slices,
                    timestamp_ns: now.saturating_sub(frames_to_ns(frames, sample_rate)),
                };
                handle.capture_audio(&source, &frame, false);
            },
            |err| tracing::warn!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| Error::device(format!("failed to build input stream: {e}")))?;
    Ok(stream)
}
