use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use mic_capture_core::{CaptureDriver, DeviceRegistry, MicrophoneError, Result};

use crate::cpal_capture::CpalDriver;

/// Environment variable that overrides the platform's default backend.
pub const BACKEND_ENV_VAR: &str = "MIC_CAPTURE_BACKEND";

/// Native capture backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Windows Audio Session API. Windows only.
    Wasapi,
    /// cpal's default host (CoreAudio, ALSA, WASAPI, ...).
    Cpal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capture backend '{0}', expected 'wasapi' or 'cpal'")]
pub struct UnknownBackend(pub String);

impl BackendKind {
    /// WASAPI on Windows, cpal everywhere else.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            BackendKind::Wasapi
        } else {
            BackendKind::Cpal
        }
    }

    /// Whether this backend was compiled in for the current target.
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::Wasapi => cfg!(target_os = "windows"),
            BackendKind::Cpal => true,
        }
    }

    /// The backend named by `MIC_CAPTURE_BACKEND`, or `None` if unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(BACKEND_ENV_VAR) {
            Ok(value) => parse_override(&value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wasapi" => Ok(BackendKind::Wasapi),
            "cpal" => Ok(BackendKind::Cpal),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Wasapi => "wasapi",
            BackendKind::Cpal => "cpal",
        })
    }
}

fn parse_override(value: &str) -> Result<BackendKind> {
    value
        .parse()
        .map_err(|e: UnknownBackend| MicrophoneError::ConfigurationFailed(format!("{}: {}", BACKEND_ENV_VAR, e)))
}

fn select(env_override: Option<BackendKind>) -> BackendKind {
    env_override.unwrap_or_else(BackendKind::platform_default)
}

/// Build the driver for `kind`.
pub fn driver(kind: BackendKind) -> Result<Arc<dyn CaptureDriver>> {
    match kind {
        #[cfg(target_os = "windows")]
        BackendKind::Wasapi => Ok(Arc::new(crate::wasapi_mic::WasapiDriver::new())),
        #[cfg(not(target_os = "windows"))]
        BackendKind::Wasapi => Err(MicrophoneError::NotSupported(
            "the WASAPI backend is only available on Windows".into(),
        )),
        BackendKind::Cpal => Ok(Arc::new(CpalDriver::new())),
    }
}

/// The platform's default driver, honoring `MIC_CAPTURE_BACKEND`.
pub fn default_driver() -> Result<Arc<dyn CaptureDriver>> {
    let kind = select(BackendKind::from_env()?);
    log::info!("Using {} capture backend", kind);
    driver(kind)
}

/// A `DeviceRegistry` over `default_driver()`.
pub fn registry() -> Result<DeviceRegistry> {
    Ok(DeviceRegistry::new(default_driver()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("wasapi".parse::<BackendKind>().unwrap(), BackendKind::Wasapi);
        assert_eq!(" CPAL ".parse::<BackendKind>().unwrap(), BackendKind::Cpal);
        assert_eq!(
            "coreaudio".parse::<BackendKind>(),
            Err(UnknownBackend("coreaudio".into()))
        );
    }

    #[test]
    fn display_round_trips() {
        for kind in [BackendKind::Wasapi, BackendKind::Cpal] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn invalid_override_is_a_configuration_error() {
        assert!(matches!(
            parse_override("alsa"),
            Err(MicrophoneError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn override_wins_over_platform_default() {
        assert_eq!(select(None), BackendKind::platform_default());
        assert_eq!(select(Some(BackendKind::Cpal)), BackendKind::Cpal);
        assert!(BackendKind::platform_default().is_available());
    }

    #[test]
    fn cpal_driver_is_always_available() {
        let driver = driver(BackendKind::Cpal).unwrap();
        assert_eq!(driver.name(), "cpal");
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn wasapi_not_supported_off_windows() {
        assert!(!BackendKind::Wasapi.is_available());
        assert!(matches!(
            driver(BackendKind::Wasapi),
            Err(MicrophoneError::NotSupported(_))
        ));
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn wasapi_is_the_windows_default() {
        assert_eq!(BackendKind::platform_default(), BackendKind::Wasapi);
        assert_eq!(driver(BackendKind::Wasapi).unwrap().name(), "wasapi");
    }
}
