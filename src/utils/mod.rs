/// TOML configuration with validation and hot reload.
pub mod toml_config;
