// SPDX-License-Identifier: GPL-3.0-only

use cosmic_config::{Config, ConfigGet, ConfigSet, CosmicConfigEntry};
use serde::{Deserialize, Serialize};

use crate::geometry::DisplayBudget;

pub const APP_ID: &str = "com.system76.CosmicWindowSnapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Logical width of the snapshot view
    pub budget_width: u32,
    /// Logical height of the snapshot view
    pub budget_height: u32,
    /// Blank border kept on every side of the snapshot
    pub budget_margin: u32,
    /// Device pixel ratio of the output showing the snapshot
    pub device_scale: f64,
    /// Try the KWin screenshot effect first
    pub use_compositor: bool,
    /// Try DXCB shared-memory images before the direct transfer
    pub use_shared_memory: bool,
    /// X display for the capture connection, `$DISPLAY` when unset
    pub x11_display: Option<String>,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            budget_width: 200,
            budget_height: 130,
            budget_margin: 8,
            device_scale: 1.0,
            use_compositor: true,
            use_shared_memory: true,
            x11_display: None,
        }
    }
}

impl SnapshotSettings {
    /// Budget of the configured view, margins removed.
    #[must_use]
    pub fn budget(&self) -> DisplayBudget {
        DisplayBudget::from_view_size(
            self.budget_width,
            self.budget_height,
            self.budget_margin,
            self.device_scale,
        )
    }
}

impl CosmicConfigEntry for SnapshotSettings {
    const VERSION: u64 = 1;

    fn write_entry(&self, config: &Config) -> Result<(), cosmic_config::Error> {
        config.set("budget_width", self.budget_width)?;
        config.set("budget_height", self.budget_height)?;
        config.set("budget_margin", self.budget_margin)?;
        config.set("device_scale", self.device_scale)?;
        config.set("use_compositor", self.use_compositor)?;
        config.set("use_shared_memory", self.use_shared_memory)?;
        config.set("x11_display", &self.x11_display)?;
        Ok(())
    }

    fn get_entry(config: &Config) -> Result<Self, (Vec<cosmic_config::Error>, Self)> {
        let mut errors = Vec::new();
        let default = Self::default();

        let budget_width = config
            .get("budget_width")
            .unwrap_or_else(|e| { errors.push(e); default.budget_width });

        let budget_height = config
            .get("budget_height")
            .unwrap_or_else(|e| { errors.push(e); default.budget_height });

        let budget_margin = config
            .get("budget_margin")
            .unwrap_or_else(|e| { errors.push(e); default.budget_margin });

        let device_scale = config
            .get("device_scale")
            .unwrap_or_else(|e| { errors.push(e); default.device_scale });

        let use_compositor = config
            .get("use_compositor")
            .unwrap_or_else(|e| { errors.push(e); default.use_compositor });

        let use_shared_memory = config
            .get("use_shared_memory")
            .unwrap_or_else(|e| { errors.push(e); default.use_shared_memory });

        let x11_display = config
            .get("x11_display")
            .unwrap_or_else(|e| { errors.push(e); default.x11_display.clone() });

        let settings = Self {
            budget_width,
            budget_height,
            budget_margin,
            device_scale,
            use_compositor,
            use_shared_memory,
            x11_display,
        };

        if errors.is_empty() {
            Ok(settings)
        } else {
            Err((errors, settings))
        }
    }

    fn update_keys<T>(&mut self, config: &Config, _keys: &[T]) -> (Vec<cosmic_config::Error>, Vec<&'static str>)
    where
        T: AsRef<str>
    {
        // Few keys, so any change reloads all of them
        match Self::get_entry(config) {
            Ok(new_settings) => {
                *self = new_settings;
                (vec![], vec![])
            }
            Err((errors, new_settings)) => {
                *self = new_settings;
                (errors, vec![])
            }
        }
    }
}

pub struct SettingsManager {
    pub config: Config,
    pub settings: SnapshotSettings,
}

impl SettingsManager {
    #[allow(clippy::missing_errors_doc)]
    pub fn new() -> Result<Self, cosmic_config::Error> {
        let config = Config::new(APP_ID, SnapshotSettings::VERSION)?;
        let settings = match SnapshotSettings::get_entry(&config) {
            Ok(settings) => settings,
            Err((errors, settings)) => {
                tracing::debug!("{} settings missing or invalid, using defaults", errors.len());
                settings
            }
        };

        Ok(Self { config, settings })
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn save(&self) -> Result<(), cosmic_config::Error> {
        self.settings.write_entry(&self.config)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn update_budget(
        &mut self,
        width: u32,
        height: u32,
        device_scale: f64,
    ) -> Result<(), cosmic_config::Error> {
        self.settings.budget_width = width;
        self.settings.budget_height = height;
        self.settings.device_scale = device_scale;
        self.save()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set_use_compositor(&mut self, enabled: bool) -> Result<(), cosmic_config::Error> {
        self.settings.use_compositor = enabled;
        self.save()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set_use_shared_memory(&mut self, enabled: bool) -> Result<(), cosmic_config::Error> {
        self.settings.use_shared_memory = enabled;
        self.save()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set_x11_display(&mut self, display: Option<String>) -> Result<(), cosmic_config::Error> {
        self.settings.x11_display = display;
        self.save()
    }
}
