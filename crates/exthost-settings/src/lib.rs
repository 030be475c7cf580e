//! # exthost-settings
//!
//! Settings for the extension host, loaded from three layers (lowest to
//! highest priority):
//!
//! 1. **Compiled defaults**: [`ExtHostSettings::default()`]
//! 2. **User file**: `~/.exthost/settings.json`, deep-merged over the defaults
//! 3. **Environment**: `EXTHOST_*` overrides
//!
//! There is no global instance. The binary loads settings once and hands
//! them to the broker and server explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
