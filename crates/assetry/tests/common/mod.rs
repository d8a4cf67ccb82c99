//! shared fixtures of the integration tests
#![allow(dead_code)]

use std::path::Path;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ASSETRY_LOG"))
        .with_test_writer()
        .try_init();
}

/// Writes `files` (relative path, content) below `root`
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// The asset tree most tests start from
pub fn assets() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("unit.hcl", "Base = \"unit-base\"\nhp = 80\nspeed = 5\n"),
            ("unit-base.hcl", "hp = 100\n"),
            ("units/tank.hcl", "Base = \"unit\"\narmor = 3\n"),
            ("units/heavy/mammoth.hcl", "Base = \"tank\"\nhp = 400\n"),
            ("textures/grass.png", "not really a png"),
        ],
    );
    dir
}
