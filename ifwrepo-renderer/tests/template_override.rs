use chrono::NaiveDate;
use ifwrepo_core::{
    ApplicationHeader, CellId, DefaultSelection, Manifest, PackageDescriptor, UpdateFile,
};
use ifwrepo_renderer::{ManifestRenderer, MANIFEST_TEMPLATE};
use tempfile::TempDir;

fn manifest() -> Manifest {
    Manifest {
        header: ApplicationHeader {
            name: "{AnyApplication}".into(),
            version: "2.0.0".into(),
            checksum: true,
        },
        packages: vec![PackageDescriptor {
            name: CellId::from("org.citra.nightly.osx"),
            display_name: "Citra Nightly".into(),
            version: "1500".into(),
            downloadable_archive: "citra-osx-20200101-abc.7z".into(),
            update_file: UpdateFile::estimate(42),
            release_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("date"),
            description: "nightly".into(),
            default: DefaultSelection::True,
            licenses: vec![],
            script: "installscript.qs".into(),
            sha: "beef".into(),
        }],
    }
}

#[test]
fn embedded_template_renders_header_values() {
    let xml = ManifestRenderer::new()
        .expect("renderer")
        .render(&manifest())
        .expect("render");
    assert!(xml.starts_with("<Updates>"));
    assert!(xml.contains("<ApplicationVersion>2.0.0</ApplicationVersion>"));
    assert!(xml.contains("<Checksum>true</Checksum>"));
    assert!(xml.contains("<Default>true</Default>"));
    assert!(xml.contains("<Licenses>\n    </Licenses>"));
}

#[test]
fn user_template_dir_overrides_embedded_manifest() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(
        dir.path().join(MANIFEST_TEMPLATE),
        "{% for pkg in packages %}{{ pkg.name }}={{ pkg.sha }}\r\n{% endfor %}",
    )
    .expect("write override");

    let xml = ManifestRenderer::with_template_dir(Some(dir.path()))
        .expect("renderer")
        .render(&manifest())
        .expect("render");
    assert_eq!(xml, "org.citra.nightly.osx=beef\n");
}

#[test]
fn missing_user_template_dir_falls_back_to_embedded() {
    let dir = TempDir::new().expect("tempdir");
    let absent = dir.path().join("does-not-exist");
    let xml = ManifestRenderer::with_template_dir(Some(&absent))
        .expect("renderer")
        .render(&manifest())
        .expect("render");
    assert!(xml.contains("<Name>org.citra.nightly.osx</Name>"));
}

#[test]
fn broken_user_template_is_a_render_error() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join(MANIFEST_TEMPLATE), "{% for pkg in %}").expect("write");
    let result = ManifestRenderer::with_template_dir(Some(dir.path()));
    assert!(result.is_err(), "unparseable override must fail at construction");
}
