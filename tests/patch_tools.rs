//! Tests against the real `patch` and `git` programs
//!
//! Each test returns early when the tool it needs is not installed.

use patchset::package::{PATCHSET_EXTRA, PATCHSET_TYPE};
use patchset::{
    DistInstaller, MemoryLogger, Package, PatchApplicator, Reconciler, Repository, SystemRunner,
    STATE_FILENAME,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const PRISTINE: &str = "alpha\nbeta\ngamma\n";

const FIRST: &str = "--- a/src/lib.txt
+++ b/src/lib.txt
@@ -1,3 +1,3 @@
 alpha
-beta
+beta-a
 gamma
";

const SECOND: &str = "--- a/src/lib.txt
+++ b/src/lib.txt
@@ -1,3 +1,3 @@
 alpha
-beta-a
+beta-a-b
 gamma
";

fn has_tool(name: &str) -> bool {
    Command::new("sh")
        .args(["-c", &format!("command -v {name}")])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

struct Layered {
    dir: TempDir,
}

impl Layered {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("dist/pkg-x/src");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("lib.txt"), PRISTINE).unwrap();

        let installed = dir.path().join("vendor/pkg-x/src");
        fs::create_dir_all(&installed).unwrap();
        fs::write(installed.join("lib.txt"), PRISTINE).unwrap();

        for (name, body) in [("layer-a", FIRST), ("layer-b", SECOND)] {
            let patchset = dir.path().join("vendor").join(name);
            fs::create_dir_all(&patchset).unwrap();
            fs::write(patchset.join("change.diff"), body).unwrap();
        }
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn repository(&self, layers: &[&str], method: &str) -> Repository {
        let mut packages = vec![Package::new("pkg-x", "1.0.0", self.path("vendor/pkg-x"))];
        for name in ["layer-a", "layer-b"] {
            let declared: Vec<Value> = if layers.contains(&name) {
                vec![json!({"filename": "change.diff", "method": method})]
            } else {
                Vec::new()
            };
            packages.push(
                Package::new(name, "1.0.0", self.path(&format!("vendor/{name}")))
                    .with_type(PATCHSET_TYPE)
                    .with_extra_field(PATCHSET_EXTRA, json!({ "pkg-x": declared })),
            );
        }
        Repository::new(packages)
    }

    fn installer<'a>(&self, logger: &'a MemoryLogger) -> DistInstaller<'a> {
        DistInstaller::new(
            BTreeMap::from([("pkg-x".to_string(), self.path("dist/pkg-x"))]),
            logger,
        )
    }

    fn contents(&self) -> String {
        fs::read_to_string(self.path("vendor/pkg-x/src/lib.txt")).unwrap()
    }

    fn reconcile(&self, repo: &Repository) {
        let logger = MemoryLogger::new();
        let installer = self.installer(&logger);
        let applicator = PatchApplicator::new(&SystemRunner, &logger, self.dir.path());
        Reconciler::new(repo, &logger, &installer, &applicator)
            .run()
            .unwrap();
    }
}

#[test]
fn test_layered_patches_apply_in_collector_order() {
    if !has_tool("patch") {
        return;
    }
    let fx = Layered::new();

    fx.reconcile(&fx.repository(&["layer-a", "layer-b"], "patch"));

    assert_eq!(fx.contents(), "alpha\nbeta-a-b\ngamma\n");
    assert!(fx.path("vendor/pkg-x").join(STATE_FILENAME).exists());
}

#[test]
fn test_git_method_applies_from_project_root() {
    if !has_tool("git") {
        return;
    }
    let fx = Layered::new();

    fx.reconcile(&fx.repository(&["layer-a", "layer-b"], "git"));

    assert_eq!(fx.contents(), "alpha\nbeta-a-b\ngamma\n");
}

#[test]
fn test_added_layer_reinstalls_from_pristine_copy() {
    if !has_tool("patch") {
        return;
    }
    let fx = Layered::new();

    fx.reconcile(&fx.repository(&["layer-a"], "patch"));
    assert_eq!(fx.contents(), "alpha\nbeta-a\ngamma\n");

    // Reapplying layer-a on the patched tree would fail; the reinstall
    // restores pristine sources first.
    fx.reconcile(&fx.repository(&["layer-a", "layer-b"], "patch"));
    assert_eq!(fx.contents(), "alpha\nbeta-a-b\ngamma\n");

    fx.reconcile(&fx.repository(&[], "patch"));
    assert_eq!(fx.contents(), PRISTINE);
    assert!(!fx.path("vendor/pkg-x").join(STATE_FILENAME).exists());
}
