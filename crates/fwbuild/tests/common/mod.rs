//! Shared helpers for the integration tests.

#![allow(dead_code)]

use fwbuild::BuildConfig;
use std::fs;
use std::path::{Path, PathBuf};

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> BuildConfig {
    BuildConfig::load(&fixture_path(name)).unwrap()
}

/// A toolchain of shell scripts that create their outputs and append one
/// line per run to `tools.log`.
pub struct FakeToolchain {
    pub dir: PathBuf,
    pub log: PathBuf,
}

#[cfg(unix)]
impl FakeToolchain {
    pub fn install(root: &Path) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = root.join("bin");
        let log = root.join("tools.log");
        fs::create_dir_all(&dir).unwrap();

        let log_line = format!("echo \"$(basename \"$0\") $out\" >> '{}'", log.display());
        let scripts = [
            (
                "cc",
                "out=\"\"\nwhile [ $# -gt 0 ]; do\n  [ \"$1\" = \"-o\" ] && out=\"$2\"\n  shift\ndone\n\
                 echo object > \"$out\"",
            ),
            ("ar", "out=\"$2\"\necho archive > \"$out\""),
            (
                "objcopy",
                "for a in \"$@\"; do out=\"$a\"; done\necho hex > \"$out\"",
            ),
            ("objdump", "out=\"stdout\"\necho \"disassembly of $#\""),
            ("hex2c", "out=\"$2\"\necho image > \"$out\""),
        ];

        for (name, body) in scripts {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n{log_line}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        Self { dir, log }
    }

    /// Tool runs in completion order, as `<tool> <output>`.
    pub fn runs(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
