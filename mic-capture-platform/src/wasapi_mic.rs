//! WASAPI microphone capture backend.
//!
//! Opens a capture endpoint in shared mode and asks the audio engine to
//! convert to the platform PCM format (`AUTOCONVERTPCM`), so delivered
//! buffers are already 48 kHz 16-bit mono.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use windows::core::*;
use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use mic_capture_core::{CaptureDriver, CaptureHandle, Device, MicrophoneError, PcmBufferCallback, StreamRequest};

use crate::device_enumerator::{ComGuard, DeviceEnumerator};
use crate::display_id;
use crate::pcm::{duration_to_hns, ensure_platform_format};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

type StartRequest = (PcmBufferCallback, Sender<std::result::Result<(), MicrophoneError>>);

/// `CaptureDriver` over WASAPI shared-mode capture endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiDriver;

impl WasapiDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDriver for WasapiDriver {
    fn name(&self) -> &str {
        "wasapi"
    }

    fn enumerate(&self) -> std::result::Result<Vec<Device>, MicrophoneError> {
        let _com = ComGuard::init()?;
        DeviceEnumerator::new()?.list_capture_devices()
    }

    fn open(&self, request: &StreamRequest) -> std::result::Result<Box<dyn CaptureHandle>, MicrophoneError> {
        ensure_platform_format(request, self.name())?;

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (start_tx, start_rx) = crossbeam_channel::bounded(1);

        let thread_request = request.clone();
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("wasapi-mic-capture".into())
            .spawn(move || capture_thread(thread_request, thread_running, ready_tx, start_rx))
            .map_err(|e| MicrophoneError::Unknown(format!("failed to spawn mic thread: {}", e)))?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(MicrophoneError::DeviceUnavailable(
                "capture thread exited while opening the stream".into(),
            ))
        });
        if let Err(e) = opened {
            let _ = thread.join();
            return Err(e);
        }

        Ok(Box::new(WasapiHandle {
            running,
            start: Some(start_tx),
            thread: Some(thread),
        }))
    }
}

struct WasapiHandle {
    running: Arc<AtomicBool>,
    start: Option<Sender<StartRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle for WasapiHandle {
    fn register_callback(&mut self, callback: PcmBufferCallback) -> std::result::Result<(), MicrophoneError> {
        let start = self.start.take().ok_or_else(|| {
            MicrophoneError::DeviceUnavailable("capture stream already started or closed".into())
        })?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        start
            .send((callback, reply_tx))
            .map_err(|_| thread_gone())?;
        reply_rx.recv().unwrap_or_else(|_| Err(thread_gone()))
    }

    fn close(&mut self) -> std::result::Result<(), MicrophoneError> {
        self.running.store(false, Ordering::SeqCst);
        // Wakes a thread still waiting for its callback.
        self.start.take();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        if thread.thread().id() == thread::current().id() {
            return Ok(());
        }
        thread
            .join()
            .map_err(|_| MicrophoneError::Unknown("mic capture thread panicked".into()))
    }
}

impl Drop for WasapiHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Error closing WASAPI capture stream: {}", e);
        }
    }
}

/// Capture thread body.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Resolve the capture device (default or by ID) and initialize the client
/// 3. Report the outcome to `open`
/// 4. Wait for the callback, register with MMCSS and start
/// 5. Poll for packets until `running` is cleared
fn capture_thread(
    request: StreamRequest,
    running: Arc<AtomicBool>,
    ready: Sender<std::result::Result<(), MicrophoneError>>,
    start: Receiver<StartRequest>,
) {
    let _com = match ComGuard::init() {
        Ok(guard) => guard,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let stream = match unsafe { CaptureStream::open(&request) } {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // Disconnected: the handle was closed before a callback was registered.
    let Ok((callback, reply)) = start.recv() else {
        return;
    };
    let started = unsafe { stream.start() };
    let failed = started.is_err();
    let _ = reply.send(started);
    if failed {
        return;
    }

    log::debug!("WASAPI capture started on '{}'", display_id(&request.device_id));
    if let Err(e) = unsafe { stream.run(&running, &callback) } {
        log::error!("Mic capture error: {}", e);
    }
}

struct CaptureStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    block_align: usize,
}

impl CaptureStream {
    unsafe fn open(request: &StreamRequest) -> std::result::Result<Self, MicrophoneError> {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| MicrophoneError::DeviceUnavailable(format!("failed to create enumerator: {}", e)))?;

        let device = if request.device_id.is_empty() {
            enumerator.GetDefaultAudioEndpoint(eCapture, eConsole)
        } else {
            enumerator.GetDevice(&HSTRING::from(request.device_id.as_str()))
        }
        .map_err(|e| {
            MicrophoneError::DeviceUnavailable(format!(
                "capture device '{}' not available: {}",
                display_id(&request.device_id),
                e
            ))
        })?;

        let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| {
            if e.code() == E_ACCESSDENIED {
                MicrophoneError::DeviceUnavailable("microphone access is disabled in Windows privacy settings".into())
            } else {
                MicrophoneError::DeviceUnavailable(format!("Activate failed: {}", e))
            }
        })?;

        let format = request.format;
        let wave_format = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_PCM as u16,
            nChannels: format.channels,
            nSamplesPerSec: format.sample_rate,
            nAvgBytesPerSec: format.byte_rate() as u32,
            nBlockAlign: format.block_align() as u16,
            wBitsPerSample: format.bits_per_sample,
            cbSize: 0,
        };

        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                duration_to_hns(request.buffer_duration),
                0,
                &wave_format,
                None,
            )
            .map_err(|e| MicrophoneError::DeviceUnavailable(format!("IAudioClient::Initialize failed: {}", e)))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| MicrophoneError::DeviceUnavailable(format!("GetService failed: {}", e)))?;

        Ok(Self {
            audio_client,
            capture_client,
            block_align: format.block_align(),
        })
    }

    unsafe fn start(&self) -> std::result::Result<(), MicrophoneError> {
        let mut task_index: u32 = 0;
        if let Err(e) = AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) {
            log::debug!("MMCSS registration failed: {}", e);
        }

        self.audio_client
            .Start()
            .map_err(|e| MicrophoneError::DeviceUnavailable(format!("IAudioClient::Start failed: {}", e)))
    }

    unsafe fn run(&self, running: &AtomicBool, callback: &PcmBufferCallback) -> std::result::Result<(), MicrophoneError> {
        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let mut packet_length = self.next_packet_size()?;
            while packet_length > 0 {
                let mut data: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut data, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| MicrophoneError::Unknown(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !data.is_null() {
                    let len = num_frames as usize * self.block_align;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        callback(&vec![0u8; len]);
                    } else {
                        callback(std::slice::from_raw_parts(data, len));
                    }
                }

                self.capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| MicrophoneError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = self.next_packet_size()?;
            }
        }
        Ok(())
    }

    unsafe fn next_packet_size(&self) -> std::result::Result<u32, MicrophoneError> {
        self.capture_client
            .GetNextPacketSize()
            .map_err(|e| MicrophoneError::Unknown(format!("GetNextPacketSize failed: {}", e)))
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
        }
    }
}

fn thread_gone() -> MicrophoneError {
    MicrophoneError::DeviceUnavailable("mic capture thread is no longer running".into())
}
