//! Tera rendering engine with [`TemplateEngine`] and [`ManifestRenderer`].
//!
//! This module is the only place that knows the concrete syntax of the
//! published `Updates.xml`. Everything upstream works with
//! [`Manifest`](ifwrepo_core::Manifest) values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use ifwrepo_core::types::Manifest;

use crate::context::ManifestContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

/// Name of the manifest template; a user file with this name overrides it.
pub const MANIFEST_TEMPLATE: &str = "updates.xml.tera";

const TPLS: &[(&str, &str)] = &[(MANIFEST_TEMPLATE, include_str!("templates/updates.xml.tera"))];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents.replace("\r\n", "\n")));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    // Escaping is explicit via `escape_xml` in the templates.
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded defaults.
/// Template names are normalised to lowercase and relative paths.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Construct a new [`TemplateEngine`], loading embedded templates plus any
    /// overrides found in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    /// Render the named template with `ctx`.
    pub fn render(&self, name: &str, ctx: &ManifestContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let rendered = self.tera.render(name, &tera_ctx)?;
        Ok(rendered.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// ManifestRenderer
// ---------------------------------------------------------------------------

/// Serialises a [`Manifest`] into the installer's `Updates.xml` syntax.
///
/// Create once with [`ManifestRenderer::new`] and reuse.
pub struct ManifestRenderer {
    engine: TemplateEngine,
}

impl ManifestRenderer {
    /// Renderer using only the embedded template.
    pub fn new() -> Result<Self, RenderError> {
        Ok(ManifestRenderer { engine: TemplateEngine::new(None)? })
    }

    /// Renderer that prefers `updates.xml.tera` from `dir` when present.
    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(ManifestRenderer { engine: TemplateEngine::new(dir)? })
    }

    /// Render the full document.
    pub fn render(&self, manifest: &Manifest) -> Result<String, RenderError> {
        let ctx = ManifestContext::from_manifest(manifest);
        self.engine.render(MANIFEST_TEMPLATE, &ctx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ifwrepo_core::{
        ApplicationHeader, CellId, DefaultSelection, License, PackageDescriptor, UpdateFile,
    };

    fn package(name: &str, description: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: CellId::from(name),
            display_name: "Citra Canary".into(),
            version: "977".into(),
            downloadable_archive: "citra-windows-mingw-20180101.7z".into(),
            update_file: UpdateFile::estimate(1_000_000),
            release_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            description: description.into(),
            default: DefaultSelection::Script,
            licenses: vec![License {
                file: "license.txt".into(),
                name: "GNU General Public License v2.0".into(),
            }],
            script: "installscript.qs".into(),
            sha: "0123abcd".into(),
        }
    }

    fn manifest(packages: Vec<PackageDescriptor>) -> Manifest {
        Manifest {
            header: ApplicationHeader::default(),
            packages,
        }
    }

    #[test]
    fn renderer_new_succeeds() {
        ManifestRenderer::new().expect("embedded template should parse");
    }

    #[test]
    fn header_only_document() {
        let xml = ManifestRenderer::new().unwrap().render(&manifest(vec![])).unwrap();
        assert_eq!(
            xml.trim_end(),
            "<Updates>\n  <ApplicationName>{AnyApplication}</ApplicationName>\n  \
             <ApplicationVersion>1.0.0</ApplicationVersion>\n  <Checksum>false</Checksum>\n</Updates>"
        );
    }

    #[test]
    fn package_entry_has_every_field() {
        let xml = ManifestRenderer::new()
            .unwrap()
            .render(&manifest(vec![package("org.citra.canary.mingw", "desc")]))
            .unwrap();
        for needle in [
            "<Name>org.citra.canary.mingw</Name>",
            "<DisplayName>Citra Canary</DisplayName>",
            "<Version>977</Version>",
            "<DownloadableArchives>citra-windows-mingw-20180101.7z</DownloadableArchives>",
            r#"<UpdateFile UncompressedSize="2000000" CompressedSize="1000000" OS="Any"/>"#,
            "<ReleaseDate>2018-01-01</ReleaseDate>",
            "<Description>desc</Description>",
            "<Default>script</Default>",
            r#"<License file="license.txt" name="GNU General Public License v2.0"/>"#,
            "<Script>installscript.qs</Script>",
            "<SHA>0123abcd</SHA>",
        ] {
            assert!(xml.contains(needle), "missing {needle} in:\n{xml}");
        }
    }

    #[test]
    fn special_characters_are_escaped() {
        let xml = ManifestRenderer::new()
            .unwrap()
            .render(&manifest(vec![package("a", "R&D <beta> \"quoted\"")]))
            .unwrap();
        assert!(xml.contains("<Description>R&amp;D &lt;beta&gt; &quot;quoted&quot;</Description>"));
    }

    #[test]
    fn entries_keep_insertion_order() {
        let xml = ManifestRenderer::new()
            .unwrap()
            .render(&manifest(vec![package("zeta", "z"), package("alpha", "a")]))
            .unwrap();
        let zeta = xml.find("<Name>zeta</Name>").unwrap();
        let alpha = xml.find("<Name>alpha</Name>").unwrap();
        assert!(zeta < alpha);
        assert_eq!(xml.matches("<PackageUpdate>").count(), 2);
    }

    #[test]
    fn no_crlf_in_rendered_output() {
        let xml = ManifestRenderer::new()
            .unwrap()
            .render(&manifest(vec![package("a", "one\r\ntwo")]))
            .unwrap();
        assert!(!xml.contains('\r'), "line endings not normalised");
    }
}
