//! Modem power control
//!
//! The modem's power key and reset lines are driven through GPIO. The
//! sequence itself lives here; the pin access sits behind [`PowerControl`].

mod gpio;

pub use gpio::SysfsGpio;

use anyhow::Result;
use async_trait::async_trait;
use ntrip_shared::timing;
use tokio::time::{sleep, Duration};
use tracing::info;

/// Access to the modem's power key and reset lines
#[async_trait]
pub trait PowerControl: Send {
    /// Drive the reset line (high pulls the modem's reset low through a transistor)
    async fn set_reset(&mut self, high: bool) -> Result<()>;

    /// Drive the power key line
    async fn set_power_key(&mut self, high: bool) -> Result<()>;

    /// Whether this controller can actually switch the modem
    fn is_switchable(&self) -> bool {
        true
    }
}

/// For modems powered independently (USB dongles, always-on boards)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPowerControl;

#[async_trait]
impl PowerControl for NoPowerControl {
    async fn set_reset(&mut self, _high: bool) -> Result<()> {
        Ok(())
    }

    async fn set_power_key(&mut self, _high: bool) -> Result<()> {
        Ok(())
    }

    fn is_switchable(&self) -> bool {
        false
    }
}

/// Pulse reset, cycle the power key, then wait for the modem to boot
pub async fn power_on<P: PowerControl + ?Sized>(pins: &mut P) -> Result<()> {
    info!("[POWER] Resetting modem");
    pins.set_reset(true).await?;
    sleep(Duration::from_millis(timing::RESET_PULSE_MS)).await;
    pins.set_reset(false).await?;

    info!("[POWER] Cycling power key");
    pins.set_power_key(false).await?;
    sleep(Duration::from_millis(timing::POWER_KEY_PULSE_MS)).await;
    pins.set_power_key(true).await?;

    sleep(Duration::from_millis(timing::BOOT_WAIT_MS)).await;
    Ok(())
}
