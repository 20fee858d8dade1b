//! ifwrepo core library: domain types, configuration, templates, errors.
//!
//! Public API surface:
//! - [`types`]: families, platforms, releases and manifest entries
//! - [`config`]: YAML configuration load / validate
//! - [`template`]: placeholder templates for family fields
//! - [`error`]: [`ConfigError`], [`TemplateError`]

pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use config::{ApplicationHeader, Config, PackerConfig, SourceConfig, MANIFEST_FILE_NAME};
pub use error::{ConfigError, TemplateError};
pub use template::{Placeholder, Template, TemplateVars};
pub use types::{
    Cell, CellId, DefaultSelection, Family, License, Manifest, PackageDescriptor, PlatformTag,
    Release, UpdateFile,
};
