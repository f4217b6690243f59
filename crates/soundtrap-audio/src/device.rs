use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use soundtrap_foundation::ConfigError;

/// Thin view over the default cpal host for lookup and diagnostics.
pub struct DeviceCatalog {
    host: Host,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Names of all input devices, sorted for display.
    pub fn input_device_names(&self) -> Vec<String> {
        let mut names = match self.host.input_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                tracing::warn!("failed to enumerate input devices: {e}");
                Vec::new()
            }
        };
        names.sort();
        names
    }

    /// Names of all output devices, sorted for display.
    pub fn output_device_names(&self) -> Vec<String> {
        let mut names = match self.host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                tracing::warn!("failed to enumerate output devices: {e}");
                Vec::new()
            }
        };
        names.sort();
        names
    }

    pub fn open_input(&self, name: &str) -> Result<Device, ConfigError> {
        find_named(self.host.input_devices()?.collect(), name)
    }

    pub fn open_output(&self, name: &str) -> Result<Device, ConfigError> {
        find_named(self.host.output_devices()?.collect(), name)
    }
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact name match first, then a case-insensitive substring fallback.
fn find_named(mut devices: Vec<Device>, name: &str) -> Result<Device, ConfigError> {
    if let Some(pos) = devices
        .iter()
        .position(|d| d.name().map(|n| n == name).unwrap_or(false))
    {
        return Ok(devices.swap_remove(pos));
    }

    let wanted = name.to_lowercase();
    if let Some(pos) = devices.iter().position(|d| {
        d.name()
            .map(|n| n.to_lowercase().contains(&wanted))
            .unwrap_or(false)
    }) {
        let device = devices.swap_remove(pos);
        tracing::warn!(
            "no exact match for '{}', using '{}'",
            name,
            device.name().unwrap_or_default()
        );
        return Ok(device);
    }

    Err(ConfigError::DeviceNotFound {
        name: name.to_string(),
    })
}
