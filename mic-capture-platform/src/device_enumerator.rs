//! Windows capture endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list every capture (microphone) endpoint,
//! including disabled and unplugged ones, with friendly names and transport
//! types.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use mic_capture_core::{Device, MicrophoneError, TransportType};

use crate::transport::transport_from_enumerator_name;

/// Initializes COM (MTA) for the current thread and uninitializes on drop.
///
/// A thread that already entered an STA keeps it; the guard then does nothing.
pub(crate) struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    pub(crate) fn init() -> std::result::Result<Self, MicrophoneError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { initialized: false });
        }
        hr.ok()
            .map_err(|e| MicrophoneError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Capture endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> std::result::Result<Self, MicrophoneError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| MicrophoneError::Enumeration(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List every capture endpoint in any state. Only `DEVICE_STATE_ACTIVE`
    /// endpoints are reported as enabled.
    pub fn list_capture_devices(&self) -> std::result::Result<Vec<Device>, MicrophoneError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATEMASK_ALL)
                .map_err(|e| MicrophoneError::Enumeration(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| MicrophoneError::Enumeration(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_capture_device_id();

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = collection.Item(i).map_err(|e| {
                    MicrophoneError::Enumeration(format!("failed to read capture endpoint {}: {}", i, e))
                })?;
                let id = Self::endpoint_id(&device)?;

                let name = Self::friendly_name(&device).unwrap_or_else(|| format!("Microphone {}", i + 1));
                let is_enabled = device.GetState().map(|s| s == DEVICE_STATE_ACTIVE).unwrap_or(false);
                let is_default = default_id.as_deref() == Some(id.as_str());
                let transport = Self::transport_type(&device);

                devices.push(Device::new(name, id, is_default, is_enabled).with_transport(transport));
            }

            Ok(devices)
        }
    }

    /// ID of the default console capture endpoint, if there is one.
    pub fn default_capture_device_id(&self) -> Option<String> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .ok()
                .and_then(|d| Self::endpoint_id(&d).ok())
        }
    }

    /// Endpoint id string. The COM-allocated buffer is released here.
    fn endpoint_id(device: &IMMDevice) -> std::result::Result<String, MicrophoneError> {
        unsafe {
            let raw = device
                .GetId()
                .map_err(|e| MicrophoneError::Enumeration(format!("failed to read endpoint id: {}", e)))?;
            let id = raw.to_string();
            CoTaskMemFree(Some(raw.0 as *const _));
            id.map_err(|e| MicrophoneError::Enumeration(format!("endpoint id is not valid UTF-16: {}", e)))
        }
    }

    fn friendly_name(device: &IMMDevice) -> Option<String> {
        let store = Self::property_store(device)?;
        let value = unsafe { store.GetValue(&PKEY_Device_FriendlyName) }.ok()?;
        non_empty(value.to_string())
    }

    fn transport_type(device: &IMMDevice) -> TransportType {
        Self::property_store(device)
            .and_then(|store| unsafe { store.GetValue(&PKEY_Device_EnumeratorName) }.ok())
            .and_then(|value| non_empty(value.to_string()))
            .map(|name| transport_from_enumerator_name(&name))
            .unwrap_or(TransportType::Unknown)
    }

    fn property_store(device: &IMMDevice) -> Option<IPropertyStore> {
        unsafe { device.OpenPropertyStore(STGM_READ) }.ok()
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
