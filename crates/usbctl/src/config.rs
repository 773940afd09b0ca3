//! usbctl configuration management

use crate::usb::enumerator::DeviceFilter;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsbctlConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Unbind kernel drivers before claiming (where the platform allows it)
    #[serde(default = "UsbSettings::default_detach")]
    pub detach_kernel_driver: bool,
    /// Vendor filter used when none is given on the command line
    #[serde(default = "UsbSettings::default_id")]
    pub default_vendor_id: String,
    /// Product filter used when none is given on the command line
    #[serde(default = "UsbSettings::default_id")]
    pub default_product_id: String,
    /// Device location used when neither `--device` nor `USBCTL_DEVICE`
    /// is set
    #[serde(default)]
    pub default_device: Option<String>,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            detach_kernel_driver: Self::default_detach(),
            default_vendor_id: Self::default_id(),
            default_product_id: Self::default_id(),
            default_device: None,
        }
    }
}

impl UsbSettings {
    fn default_detach() -> bool {
        true
    }

    fn default_id() -> String {
        "0x0000".to_string()
    }
}

impl UsbctlConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_existing(&Self::search_paths())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: UsbctlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load from the standard locations, falling back to defaults
    ///
    /// The second element explains why the defaults are in use. Logging is
    /// usually not set up yet at this point, so the caller reports it.
    pub fn load_or_default() -> (Self, Option<anyhow::Error>) {
        Self::load_first_of(&Self::search_paths())
    }

    /// Load the first existing file of `candidates`, or the defaults
    ///
    /// A file that exists but does not parse or validate is not skipped in
    /// favour of a later candidate.
    pub fn load_first_of(candidates: &[PathBuf]) -> (Self, Option<anyhow::Error>) {
        let Some(path) = Self::find_existing(candidates) else {
            return (Self::default(), Some(anyhow!("No configuration file found")));
        };

        match Self::load(Some(path)) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Standard locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        vec![Self::default_path(), PathBuf::from("/etc/usbctl/usbctl.toml")]
    }

    fn find_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbctl").join("usbctl.toml")
        } else {
            PathBuf::from(".config/usbctl/usbctl.toml")
        }
    }

    /// Filter built from the configured default ids
    pub fn default_filter(&self) -> Result<DeviceFilter> {
        let vendor_id = parse_hex_id(&self.usb.default_vendor_id)
            .map_err(|e| anyhow!("Invalid default_vendor_id: {}", e))?;
        let product_id = parse_hex_id(&self.usb.default_product_id)
            .map_err(|e| anyhow!("Invalid default_product_id: {}", e))?;
        Ok(DeviceFilter::new(vendor_id, product_id))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        Self::validate_hex_id(&self.usb.default_vendor_id, "VID")?;
        Self::validate_hex_id(&self.usb.default_product_id, "PID")?;

        if let Some(device) = &self.usb.default_device {
            device
                .parse::<crate::usb::descriptor::DeviceLocation>()
                .map_err(|e| anyhow!("Invalid default_device: {}", e))?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("Invalid {} '{}', not a valid hex number", name, id));
        }

        Ok(())
    }
}

/// Parse a 16-bit id written as hex, with or without a `0x` prefix
///
/// Used both for config values and as a clap value parser.
pub fn parse_hex_id(s: &str) -> std::result::Result<u16, String> {
    let trimmed = s.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.is_empty() || hex.len() > 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not a 16-bit hex id", s));
    }
    u16::from_str_radix(hex, 16).map_err(|_| format!("'{}' is not a 16-bit hex id", s))
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
