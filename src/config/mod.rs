//! Configuration module for tablegraph.
//!
//! Handles the TOML settings consumed by the graph loaders and the compiler.

mod settings;

pub use settings::{
    expand_env_vars, ClassOverride, FieldOverride, LoaderSettings, NamingSettings, Settings,
    SettingsError,
};
