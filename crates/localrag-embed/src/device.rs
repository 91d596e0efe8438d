use candle_core::Device;

pub const DEVICE_ENV: &str = "APP_EMBED_DEVICE";

/// Where the BGE-M3 model should run. `Auto` takes Metal when the crate is
/// built with it and a GPU answers, CPU otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Metal,
}

impl DevicePreference {
    /// Parse `auto` / `cpu` / `metal` (any case). Unknown values fall back to `Auto`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Self::Cpu,
            "metal" | "mps" => Self::Metal,
            "" | "auto" => Self::Auto,
            other => {
                tracing::warn!(value = other, "unknown {}, using auto", DEVICE_ENV);
                Self::Auto
            }
        }
    }

    pub fn from_env() -> Self { std::env::var(DEVICE_ENV).map(|v| Self::parse(&v)).unwrap_or_default() }
}

pub fn select_device() -> Device { device_for(DevicePreference::from_env()) }

pub fn device_for(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Cpu {
        tracing::info!("device: CPU (requested)");
        return Device::Cpu;
    }
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => {
                tracing::info!("device: Metal");
                return dev;
            }
            Err(e) => tracing::debug!(error = %e, "metal unavailable"),
        }
    }
    if preference == DevicePreference::Metal {
        tracing::warn!("metal requested but unavailable, embedding on CPU");
    } else {
        tracing::info!("device: CPU");
    }
    Device::Cpu
}
