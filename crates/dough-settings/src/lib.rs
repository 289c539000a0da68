//! # dough-settings
//!
//! Configuration for the presence client, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.doughmination/settings.json` (overlaid on defaults)
//! 3. **Environment variables**: `DOUGH_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, load_settings, load_settings_from_path, overlay, settings_path, validate,
};
pub use types::*;
