//! # ifwrepo-renderer
//!
//! Tera-based serialisation of the update manifest into the installer
//! framework's `Updates.xml` document.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ifwrepo_core::{ApplicationHeader, Manifest};
//! use ifwrepo_renderer::ManifestRenderer;
//!
//! fn render_empty() {
//!     let manifest = Manifest { header: ApplicationHeader::default(), packages: vec![] };
//!     if let Ok(renderer) = ManifestRenderer::new() {
//!         if let Ok(xml) = renderer.render(&manifest) {
//!             println!("{xml}");
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::ManifestContext;
pub use engine::{ManifestRenderer, TemplateEngine, MANIFEST_TEMPLATE};
pub use error::RenderError;
