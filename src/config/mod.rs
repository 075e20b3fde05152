//! Configuration merge system
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`, optional)
//! 3. CLI flags

mod defaults;
mod effective;
mod views;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use views::{HandshakeConfig, QrConfig};
