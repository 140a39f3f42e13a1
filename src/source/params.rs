//! Device parameter negotiation with safe-mode fallback.

use crate::geometry::Resolution;
use crate::hardware::{CameraDevice, CameraParameters, FocusMode, HardwareError};

/// How far parameter negotiation got on the last open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Configuration {
    /// The desired parameters were accepted.
    Desired,
    /// The desired parameters were rejected; minimal safe-mode parameters
    /// applied on top of the previously working set.
    SafeMode,
    /// Even safe mode was rejected; the device runs with whatever it has.
    Unconfigured,
}

/// Picks the preview stream size for a screen.
///
/// Uses the screen resolution when the device advertises it, otherwise the
/// device's current preview size.
pub(crate) fn choose_preview_size(params: &CameraParameters, screen: Resolution) -> Resolution {
    if params.supported_preview_sizes.contains(&screen) {
        screen
    } else {
        params.preview_size
    }
}

fn choose_focus_mode(supported: &[FocusMode], safe_mode: bool) -> Option<FocusMode> {
    let candidates: &[FocusMode] = if safe_mode {
        &[FocusMode::Auto]
    } else {
        &[FocusMode::Auto, FocusMode::Macro]
    };
    candidates.iter().copied().find(|m| supported.contains(m))
}

fn apply(
    device: &mut dyn CameraDevice,
    preview_size: &mut Resolution,
    safe_mode: bool,
) -> Result<(), HardwareError> {
    let mut params = device.parameters()?;
    if let Some(mode) = choose_focus_mode(&params.supported_focus_modes, safe_mode) {
        params.focus_mode = mode;
    }
    params.preview_size = *preview_size;
    device.set_parameters(&params)?;

    let actual = device.parameters()?.preview_size;
    if actual != *preview_size {
        tracing::warn!(
            requested = %preview_size,
            actual = %actual,
            "camera accepted preview size but reports a different one"
        );
        *preview_size = actual;
    }
    Ok(())
}

/// Applies the desired parameters, falling back to safe mode.
///
/// Never fails: the worst outcome is an unconfigured preview. `preview_size`
/// is updated to what the device actually uses.
pub(crate) fn configure(
    device: &mut dyn CameraDevice,
    preview_size: &mut Resolution,
) -> Configuration {
    let saved = match device.parameters() {
        Ok(params) => params,
        Err(e) => {
            tracing::error!(error = %e, "cannot read camera parameters, no configuration");
            return Configuration::Unconfigured;
        }
    };

    let Err(e) = apply(device, preview_size, false) else {
        return Configuration::Desired;
    };

    tracing::error!(error = %e, "camera rejected parameters, setting only minimal safe-mode parameters");
    tracing::debug!(?saved, "resetting to saved camera parameters");
    let retry = device
        .set_parameters(&saved)
        .and_then(|()| apply(device, preview_size, true));
    match retry {
        Ok(()) => Configuration::SafeMode,
        Err(e) => {
            tracing::error!(error = %e, "camera rejected even safe-mode parameters, no configuration");
            Configuration::Unconfigured
        }
    }
}
