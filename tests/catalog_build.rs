//! Catalog build tests against service folders on disk
//!
//! Each test writes a small AutoRest-style service folder (readme.md plus
//! spec documents) into a fresh temporary directory.

use serde_json::json;
use spectree::catalog::{
    presets, CatalogBuilder, CatalogConfig, CatalogError, PathOverride, SpecDocument, Verb,
};
use std::path::{Path, PathBuf};

const VMSS: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}/providers/Microsoft.Compute/virtualMachineScaleSets";

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("spectree-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.0.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn readme(tags: &[(&str, &[&str])]) -> String {
    let mut out = String::from("# Service\n\n``` yaml\nopenapi-type: arm\ntag: package-2019-07\n```\n\n");
    for (tag, files) in tags {
        out.push_str(&format!("```yaml $(tag) == '{}'\ninput-file:\n", tag));
        for file in *files {
            out.push_str(&format!("- {}\n", file));
        }
        out.push_str("```\n\n");
    }
    out
}

fn spec(version: &str, paths: serde_json::Value) -> String {
    json!({
        "swagger": "2.0",
        "info": { "title": "Compute", "version": version },
        "paths": paths
    })
    .to_string()
}

#[test]
fn test_service_dir_loads_latest_stable_version() {
    let dir = TempDir::new();
    dir.write(
        "readme.md",
        &readme(&[
            ("package-2019-10-preview", &["preview/2019-10-01-preview/compute.json"]),
            ("package-2019-07", &["stable/2019-07-01/compute.json"]),
            ("package-2019-03", &["stable/2019-03-01/compute.json"]),
        ]),
    );
    dir.write(
        "stable/2019-07-01/compute.json",
        &spec(
            "2019-07-01",
            json!({
                VMSS: { "get": {} },
                format!("{}/{{vmScaleSetName}}", VMSS): { "get": {}, "delete": {} }
            }),
        ),
    );
    dir.write("stable/2019-03-01/compute.json", "not even json");

    let mut builder = CatalogBuilder::new("compute", CatalogConfig::default());
    builder.add_service_dir(dir.path()).unwrap();
    let catalog = builder.build().unwrap();

    assert!(catalog.skipped.is_empty());
    assert_eq!(catalog.resource_types.len(), 1);
    let scale_sets = &catalog.resource_types[0];
    assert_eq!(scale_sets.endpoint.api_version(), Some("2019-07-01"));
    assert_eq!(scale_sets.sub_resources.len(), 1);
    assert!(scale_sets.sub_resources[0].delete_endpoint.is_some());
}

#[test]
fn test_missing_readme_skips_service() {
    let dir = TempDir::new();
    let mut builder = CatalogBuilder::new("empty", CatalogConfig::default());
    builder.add_service_dir(dir.path()).unwrap();
    let catalog = builder.build().unwrap();
    assert!(catalog.resource_types.is_empty());
}

#[test]
fn test_unparseable_document_is_skipped_and_build_continues() {
    let dir = TempDir::new();
    dir.write(
        "readme.md",
        &readme(&[("package-2019-07", &["a.json", "broken.json"])]),
    );
    dir.write("a.json", &spec("2019-07-01", json!({ VMSS: { "get": {} } })));
    dir.write("broken.json", "{ \"paths\": ");

    let mut builder = CatalogBuilder::new("compute", CatalogConfig::default());
    builder.add_service_dir(dir.path()).unwrap();
    let catalog = builder.build().unwrap();

    assert_eq!(catalog.skipped.len(), 1);
    assert!(catalog.skipped[0].source.ends_with("broken.json"));
    assert_eq!(catalog.resource_types.len(), 1);
}

#[test]
fn test_conflicting_documents_abort_the_build() {
    let dir = TempDir::new();
    dir.write(
        "readme.md",
        &readme(&[("package-2019-07", &["a.json", "b.json"])]),
    );
    dir.write("a.json", &spec("2019-07-01", json!({ "/x": { "get": {} } })));
    dir.write(
        "b.json",
        &spec("2019-07-01", json!({ "/x": { "get": { "deprecated": true } } })),
    );

    let mut builder = CatalogBuilder::new("x", CatalogConfig::default());
    let err = builder.add_service_dir(dir.path()).unwrap_err();
    match err {
        CatalogError::Conflict {
            condensed_path,
            verb,
            first_source,
            second_source,
        } => {
            assert_eq!(condensed_path, "/x");
            assert_eq!(verb, Verb::Get);
            assert!(first_source.ends_with("a.json"));
            assert!(second_source.ends_with("b.json"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_override_lets_disagreeing_documents_build() {
    let permits = SpecDocument::from_value(
        "a.json",
        &json!({ "info": { "version": "2019-07-01" }, "paths": { "/x": { "get": {} } } }),
        "",
    )
    .unwrap();
    let denies = SpecDocument::from_value(
        "b.json",
        &json!({ "info": { "version": "2019-07-01" }, "paths": { "/x": { "get": { "deprecated": true } } } }),
        "",
    )
    .unwrap();

    let mut config = CatalogConfig::default();
    config.overrides.insert("/x".to_string(), PathOverride::default());

    // Denial first, so the permitting source has to win over it
    let mut builder = CatalogBuilder::new("x", config);
    builder.add_document(&denies).unwrap();
    builder.add_document(&permits).unwrap();
    let catalog = builder.build().unwrap();

    assert_eq!(catalog.resource_types.len(), 1);
    let x = &catalog.resource_types[0];
    assert_eq!(x.endpoint.template_url(), "/x");
    assert_eq!(x.verb, Some(Verb::Get));
}

#[test]
fn test_equally_specific_templates_fail_the_build() {
    let doc = |source: &str, path: &str| {
        SpecDocument::from_value(
            source,
            &json!({ "info": { "version": "2019-07-01" }, "paths": { path: { "get": {} } } }),
            "",
        )
        .unwrap()
    };

    let mut builder = CatalogBuilder::new("files", CatalogConfig::default());
    builder.add_document(&doc("a.json", "/files/{name}.json")).unwrap();
    builder.add_document(&doc("b.json", "/files/{file}")).unwrap();

    match builder.build().unwrap_err() {
        CatalogError::AmbiguousTemplates { first, second } => {
            let mut pair = [first, second];
            pair.sort();
            assert_eq!(pair, ["/files/{file}".to_string(), "/files/{name}.json".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_preset_rewrite_builds_urls_from_replacement_path() {
    let raw = format!("{}/{{virtualMachineScaleSetName}}/virtualMachines", VMSS);
    let replacement = format!("{}/{{vmScaleSetName}}/virtualMachines", VMSS);

    let dir = TempDir::new();
    let file = dir.write(
        "compute.json",
        &spec(
            "2019-07-01",
            json!({
                format!("{}/{{vmScaleSetName}}", VMSS): { "get": {} },
                raw.clone(): { "get": {} }
            }),
        ),
    );

    let config = presets::get_preset("arm").unwrap();
    assert!(config.override_for(&raw).is_some());

    let mut builder = CatalogBuilder::new("compute", config);
    builder.add_file(&file).unwrap();
    let catalog = builder.build().unwrap();

    let vms = catalog
        .all_resource_types()
        .into_iter()
        .find(|t| t.display == "virtualMachines")
        .unwrap();
    assert_eq!(vms.endpoint.template_url(), replacement);

    let mut values = spectree::catalog::TemplateValues::new();
    for (k, v) in [
        ("subscriptionId", "s"),
        ("resourceGroupName", "rg"),
        ("vmScaleSetName", "ss"),
    ] {
        values.insert(k.to_string(), v.to_string());
    }
    assert_eq!(
        vms.endpoint.build_url(&values).unwrap(),
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachineScaleSets/ss/virtualMachines?api-version=2019-07-01"
    );
}

#[test]
fn test_catalog_round_trips_through_json() {
    let dir = TempDir::new();
    let file = dir.write(
        "pods.yaml",
        "swagger: '2.0'\ninfo:\n  version: v1\npaths:\n  /api/v1/namespaces/{namespace}/pods:\n    get: {}\n  /api/v1/namespaces/{namespace}/pods/{name}:\n    get: {}\n    delete: {}\n",
    );

    let mut builder = CatalogBuilder::new("kubernetes", presets::get_preset("kubernetes").unwrap());
    builder.add_file(&file).unwrap();
    let catalog = builder.build().unwrap();

    let out = dir.path().join("out/catalog.json");
    catalog.save(&out).unwrap();
    let loaded = spectree::catalog::Catalog::load(&out).unwrap();

    assert_eq!(loaded.resource_types, catalog.resource_types);
    let pod = &loaded.resource_types[0].sub_resources[0];
    assert_eq!(pod.endpoint.api_version(), None);
    assert_eq!(pod.children[0].display, "log");
    assert_eq!(pod.children[0].verb, Some(Verb::Get));
}
