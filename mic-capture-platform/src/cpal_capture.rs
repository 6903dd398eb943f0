//! Cross-platform capture backend built on cpal.
//!
//! cpal streams are `!Send` on several hosts, so each open stream lives on a
//! dedicated `cpal-mic-capture` thread that builds it, plays it on request
//! and drops it on close. Audio callbacks themselves run on cpal's own
//! thread and forward through a shared callback slot.
//!
//! Devices are opened at 48 kHz in their native i16 or f32 layout and the
//! samples are downmixed and converted to 16-bit mono before delivery.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use mic_capture_core::{
    CaptureDriver, CaptureHandle, Device, MicrophoneError, PcmBufferCallback, PcmFormat, Result, StreamRequest,
};

use crate::display_id;
use crate::pcm::{ensure_platform_format, f32_to_mono_le, i16_to_mono_le};

/// Holds the registered callback. Delivery happens under the lock, so
/// clearing it also waits out an in-flight delivery.
type CallbackSlot = Arc<Mutex<Option<PcmBufferCallback>>>;

enum Command {
    Play(Sender<Result<()>>),
    Stop,
}

/// `CaptureDriver` over the cpal default host. Device ids are device names.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDriver;

impl CpalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDriver for CpalDriver {
    fn name(&self) -> &str {
        "cpal"
    }

    fn enumerate(&self) -> Result<Vec<Device>> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let inputs = host
            .input_devices()
            .map_err(|e| MicrophoneError::Enumeration(format!("failed to enumerate input devices: {e}")))?;

        devices_from_names(inputs.map(|input| input.name()), default_name.as_deref())
    }

    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureHandle>> {
        ensure_platform_format(request, self.name())?;

        let slot: CallbackSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        let device_id = request.device_id.clone();
        let stream_slot = Arc::clone(&slot);
        let thread = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || stream_thread(&device_id, stream_slot, ready_tx, command_rx))
            .map_err(|e| MicrophoneError::Unknown(format!("failed to spawn capture thread: {}", e)))?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(MicrophoneError::DeviceUnavailable(
                "capture thread exited while opening the stream".into(),
            ))
        });
        if let Err(e) = opened {
            let _ = thread.join();
            return Err(e);
        }

        log::debug!("cpal input stream opened for '{}'", display_id(&request.device_id));
        Ok(Box::new(CpalHandle {
            slot,
            commands: command_tx,
            thread: Some(thread),
        }))
    }
}

struct CpalHandle {
    slot: CallbackSlot,
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle for CpalHandle {
    fn register_callback(&mut self, callback: PcmBufferCallback) -> Result<()> {
        *self.slot.lock() = Some(callback);

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let result = match self.commands.send(Command::Play(reply_tx)) {
            Ok(()) => reply_rx.recv().unwrap_or_else(|_| Err(thread_gone())),
            Err(_) => Err(thread_gone()),
        };
        if result.is_err() {
            self.slot.lock().take();
        }
        result
    }

    fn close(&mut self) -> Result<()> {
        self.slot.lock().take();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let _ = self.commands.send(Command::Stop);
        thread
            .join()
            .map_err(|_| MicrophoneError::Unknown("cpal capture thread panicked".into()))
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Error closing cpal input stream: {}", e);
        }
    }
}

fn stream_thread(device_id: &str, slot: CallbackSlot, ready: Sender<Result<()>>, commands: Receiver<Command>) {
    let stream = match build_stream(device_id, slot) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // A disconnected channel means the handle is gone; treat it as Stop.
    while let Ok(command) = commands.recv() {
        match command {
            Command::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| MicrophoneError::DeviceUnavailable(format!("failed to start input stream: {e}")));
                let _ = reply.send(result);
            }
            Command::Stop => break,
        }
    }

    drop(stream);
    log::debug!("cpal input stream for '{}' closed", display_id(device_id));
}

fn build_stream(device_id: &str, slot: CallbackSlot) -> Result<Stream> {
    let host = cpal::default_host();
    let device = if device_id.is_empty() {
        host.default_input_device()
            .ok_or_else(|| MicrophoneError::DeviceUnavailable("no default input device available".into()))?
    } else {
        host.input_devices()
            .map_err(|e| MicrophoneError::DeviceUnavailable(format!("failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
            .ok_or_else(|| MicrophoneError::DeviceUnavailable(format!("input device not found: {device_id}")))?
    };

    let rate = PcmFormat::PLATFORM.sample_rate;
    let name = display_id(device_id).to_string();

    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| MicrophoneError::DeviceUnavailable(format!("failed to query input configs of '{name}': {e}")))?
        .collect();
    let candidates: Vec<ConfigCandidate> = ranges.iter().map(ConfigCandidate::from).collect();
    let Some(index) = pick_config(&candidates, rate) else {
        return Err(MicrophoneError::DeviceUnavailable(format!(
            "'{}' cannot capture {} Hz as i16 or f32, supported: {}",
            name,
            rate,
            describe(&candidates)
        )));
    };

    let supported = ranges[index].clone().with_sample_rate(SampleRate(rate));
    let channels = supported.channels();
    let sample_format = supported.sample_format();
    let config = supported.config();
    log::debug!("Opening '{}' at {} Hz, {} ch, {:?}", name, rate, channels, sample_format);

    let error_name = name.clone();
    let on_error = move |err: cpal::StreamError| {
        log::error!("Input stream error on '{}': {}", error_name, err);
    };

    let built = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _info: &cpal::InputCallbackInfo| deliver(&slot, &i16_to_mono_le(data, channels)),
            on_error,
            None,
        ),
        _ => device.build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| deliver(&slot, &f32_to_mono_le(data, channels)),
            on_error,
            None,
        ),
    };
    built.map_err(|e| {
        MicrophoneError::DeviceUnavailable(format!(
            "failed to build {} Hz {:?} input stream on '{}': {e}",
            rate, sample_format, name
        ))
    })
}

fn deliver(slot: &CallbackSlot, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let slot = slot.lock();
    if let Some(callback) = slot.as_ref() {
        callback(bytes);
    }
}

/// Build the device list from enumerated names. Any unreadable name fails
/// the whole listing.
fn devices_from_names<E: fmt::Display>(
    names: impl IntoIterator<Item = std::result::Result<String, E>>,
    default_name: Option<&str>,
) -> Result<Vec<Device>> {
    names
        .into_iter()
        .map(|name| {
            let name =
                name.map_err(|e| MicrophoneError::Enumeration(format!("failed to read input device name: {e}")))?;
            let is_default = default_name == Some(name.as_str());
            Ok(Device::new(name.clone(), name, is_default, true))
        })
        .collect()
}

/// The parts of a supported input config that stream selection compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigCandidate {
    format: SampleFormat,
    channels: u16,
    min_rate: u32,
    max_rate: u32,
}

impl From<&SupportedStreamConfigRange> for ConfigCandidate {
    fn from(range: &SupportedStreamConfigRange) -> Self {
        Self {
            format: range.sample_format(),
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
        }
    }
}

/// Index of the best candidate covering `rate`: i16 before f32, then the
/// fewest channels.
fn pick_config(candidates: &[ConfigCandidate], rate: u32) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.channels > 0 && c.min_rate <= rate && rate <= c.max_rate)
        .filter_map(|(i, c)| format_rank(c.format).map(|rank| (rank, c.channels, i)))
        .min()
        .map(|(_, _, i)| i)
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        _ => None,
    }
}

fn describe(candidates: &[ConfigCandidate]) -> String {
    if candidates.is_empty() {
        return "none".into();
    }
    candidates
        .iter()
        .map(|c| format!("{}ch {}-{} Hz {:?}", c.channels, c.min_rate, c.max_rate, c.format))
        .collect::<Vec<_>>()
        .join(", ")
}

fn thread_gone() -> MicrophoneError {
    MicrophoneError::DeviceUnavailable("cpal capture thread is no longer running".into())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn candidate(format: SampleFormat, channels: u16, min_rate: u32, max_rate: u32) -> ConfigCandidate {
        ConfigCandidate {
            format,
            channels,
            min_rate,
            max_rate,
        }
    }

    #[test]
    fn unreadable_name_fails_the_whole_listing() {
        let names: Vec<std::result::Result<String, &str>> = vec![Ok("USB Mic".into()), Err("device vanished")];
        let err = devices_from_names(names, Some("USB Mic")).unwrap_err();
        assert!(matches!(err, MicrophoneError::Enumeration(ref msg) if msg.contains("device vanished")));
    }

    #[test]
    fn default_name_marks_one_device() {
        let names: Vec<std::result::Result<String, &str>> = vec![Ok("Built-in".into()), Ok("USB Mic".into())];
        let devices = devices_from_names(names, Some("USB Mic")).unwrap();
        assert_eq!(devices.len(), 2);
        assert!(!devices[0].is_default);
        assert!(devices[1].is_default);
        assert_eq!(devices[1].id, "USB Mic");
    }

    #[test]
    fn i16_mono_preferred() {
        let candidates = [
            candidate(SampleFormat::F32, 1, 8_000, 96_000),
            candidate(SampleFormat::I16, 2, 48_000, 48_000),
            candidate(SampleFormat::I16, 1, 44_100, 48_000),
        ];
        assert_eq!(pick_config(&candidates, 48_000), Some(2));
    }

    #[test]
    fn float_used_when_no_i16_covers_rate() {
        let candidates = [
            candidate(SampleFormat::I16, 1, 44_100, 44_100),
            candidate(SampleFormat::F32, 2, 44_100, 48_000),
            candidate(SampleFormat::U8, 1, 48_000, 48_000),
        ];
        assert_eq!(pick_config(&candidates, 48_000), Some(1));
    }

    #[test]
    fn no_usable_config_is_described() {
        let candidates = [
            candidate(SampleFormat::I16, 2, 44_100, 44_100),
            candidate(SampleFormat::I32, 1, 48_000, 48_000),
        ];
        assert_eq!(pick_config(&candidates, 48_000), None);
        assert_eq!(describe(&candidates), "2ch 44100-44100 Hz I16, 1ch 48000-48000 Hz I32");
        assert_eq!(describe(&[]), "none");
    }

    #[test]
    fn non_platform_format_is_rejected_before_touching_host() {
        let request = StreamRequest {
            device_id: String::new(),
            format: PcmFormat {
                sample_rate: 44_100,
                ..PcmFormat::PLATFORM
            },
            buffer_duration: Duration::from_millis(100),
        };
        let err = CpalDriver::new().open(&request).err().unwrap();
        assert!(matches!(err, MicrophoneError::NotSupported(_)));
    }
}
