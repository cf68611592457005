//! Audio-Geraete-Auswahl
//!
//! Die Engines brauchen nur das cpal-Device, auf dem sie ihren Stream
//! oeffnen. Geraete-Enumeration und Berechtigungen sind Sache der
//! einbettenden Anwendung; hier gibt es die Standard-Geraete und die
//! Suche nach Namen.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

use crate::error::{AudioError, AudioResult};

/// Laedt das Eingabegeraet: Standard-Geraet oder Suche nach Namen.
pub fn input_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or(AudioError::KeinStandardEingabegeraet),
        Some(n) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            for device in devices {
                if device.name().map(|d| d.contains(n)).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::GeraetNichtGefunden(n.to_string()))
        }
    }
}

/// Laedt das Ausgabegeraet: Standard-Geraet oder Suche nach Namen.
pub fn output_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet),
        Some(n) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            for device in devices {
                if device.name().map(|d| d.contains(n)).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::GeraetNichtGefunden(n.to_string()))
        }
    }
}
