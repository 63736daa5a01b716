//! Linux sysfs GPIO backend

use super::PowerControl;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Power key and reset lines exported through `/sys/class/gpio`
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    reset: u32,
    power_key: u32,
}

impl SysfsGpio {
    /// Export both pins as outputs
    pub async fn open(reset: u32, power_key: u32) -> Result<Self> {
        Self::open_at(SYSFS_GPIO_ROOT, reset, power_key).await
    }

    async fn open_at(root: impl AsRef<Path>, reset: u32, power_key: u32) -> Result<Self> {
        let gpio = Self {
            root: root.as_ref().to_path_buf(),
            reset,
            power_key,
        };
        gpio.export(reset).await?;
        gpio.export(power_key).await?;
        Ok(gpio)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    async fn export(&self, pin: u32) -> Result<()> {
        if fs::metadata(self.pin_dir(pin)).await.is_err() {
            fs::write(self.root.join("export"), pin.to_string())
                .await
                .with_context(|| format!("exporting GPIO {}", pin))?;
        }
        fs::write(self.pin_dir(pin).join("direction"), "out")
            .await
            .with_context(|| format!("setting GPIO {} as output", pin))?;
        Ok(())
    }

    async fn write(&self, pin: u32, high: bool) -> Result<()> {
        let value = if high { "1" } else { "0" };
        fs::write(self.pin_dir(pin).join("value"), value)
            .await
            .with_context(|| format!("writing GPIO {}", pin))
    }
}

#[async_trait]
impl PowerControl for SysfsGpio {
    async fn set_reset(&mut self, high: bool) -> Result<()> {
        self.write(self.reset, high).await
    }

    async fn set_power_key(&mut self, high: bool) -> Result<()> {
        self.write(self.power_key, high).await
    }
}
