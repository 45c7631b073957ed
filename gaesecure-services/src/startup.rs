//! One-time process initialisation. Call [`bootstrap`] once, before the
//! service starts accepting requests.

use anyhow::Context;
use gaesecure_core::urlfetch::{self, PatchError};
use tracing::warn;

use crate::config::Settings;
use crate::logging::setup_logging;

/// Applies the urlfetch certificate patch when `settings` asks for it.
///
/// Returns whether the patch was applied by this call.
pub fn apply_startup_patches(settings: &Settings) -> Result<bool, PatchError> {
    if !settings.validate_certificates {
        warn!("Certificate validation patch disabled; outbound fetches use platform defaults");
        return Ok(false);
    }
    urlfetch::apply_patches()?;
    Ok(true)
}

pub fn bootstrap(settings: &Settings) -> anyhow::Result<()> {
    setup_logging(settings).context("failed to install tracing subscriber")?;
    apply_startup_patches(settings).context("startup patches already applied")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_apply_exactly_once() {
        let disabled = Settings {
            validate_certificates: false,
            ..Settings::default()
        };
        assert_eq!(apply_startup_patches(&disabled), Ok(false));
        assert!(!urlfetch::patches_applied());

        let settings = Settings::default();
        assert_eq!(apply_startup_patches(&settings), Ok(true));
        assert!(urlfetch::patches_applied());
        assert_eq!(
            apply_startup_patches(&settings),
            Err(PatchError::AlreadyApplied)
        );
    }
}
