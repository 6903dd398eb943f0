use std::sync::Arc;

use crate::models::config::MicrophoneConfiguration;
use crate::models::device::Device;
use crate::models::error::{MicrophoneError, Result};
use crate::session::microphone::Microphone;
use crate::traits::capture_driver::CaptureDriver;

/// Entry point for discovering microphones.
///
/// Every call re-queries the driver; nothing is cached, so hot-plugged
/// devices show up on the next call.
pub struct DeviceRegistry {
    driver: Arc<dyn CaptureDriver>,
    config: MicrophoneConfiguration,
}

impl DeviceRegistry {
    pub fn new(driver: Arc<dyn CaptureDriver>) -> Self {
        Self {
            driver,
            config: MicrophoneConfiguration::default(),
        }
    }

    /// Registry whose microphones all start with `config`.
    pub fn with_configuration(driver: Arc<dyn CaptureDriver>, config: MicrophoneConfiguration) -> Result<Self> {
        config.validate().map_err(MicrophoneError::ConfigurationFailed)?;
        Ok(Self { driver, config })
    }

    pub fn configuration(&self) -> &MicrophoneConfiguration {
        &self.config
    }

    /// Every enabled capture device, in enumeration order.
    pub fn list_all(&self) -> Result<Vec<Device>> {
        let devices = self.driver.enumerate().map_err(enumeration_error)?;
        let total = devices.len();
        let enabled: Vec<Device> = devices.into_iter().filter(|d| d.is_enabled).collect();

        log::debug!(
            "{}: {} capture devices, {} enabled",
            self.driver.name(),
            total,
            enabled.len()
        );
        Ok(enabled)
    }

    /// The first device that is both default and enabled, if any.
    pub fn get_default(&self) -> Result<Option<Device>> {
        let devices = self.driver.enumerate().map_err(enumeration_error)?;
        let default = devices.into_iter().find(Device::is_usable_default);
        if default.is_none() {
            log::debug!("{}: no default capture device", self.driver.name());
        }
        Ok(default)
    }

    /// A stopped microphone for each enabled device.
    pub fn all(&self) -> Result<Vec<Microphone>> {
        Ok(self.list_all()?.iter().map(|d| self.microphone(d)).collect())
    }

    pub fn default_microphone(&self) -> Result<Option<Microphone>> {
        Ok(self.get_default()?.map(|d| self.microphone(&d)))
    }

    /// Build a stopped microphone for `device`.
    pub fn microphone(&self, device: &Device) -> Microphone {
        Microphone::from_parts(
            device.name.clone(),
            device.id.clone(),
            Arc::clone(&self.driver),
            &self.config,
        )
    }
}

fn enumeration_error(error: MicrophoneError) -> MicrophoneError {
    match error {
        MicrophoneError::Enumeration(_) => error,
        other => MicrophoneError::Enumeration(other.to_string()),
    }
}
