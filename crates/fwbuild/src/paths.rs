//! Source → destination path arithmetic.
//!
//! All paths are normalized lexically, without touching the filesystem, so
//! every mapping here is a pure function of its inputs.

use crate::config::{ModuleContext, SourceEntry};
use crate::error::Result;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// A source file together with where its build products go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub source: PathBuf,
    pub dest_root: PathBuf,
    /// Leading segments of `source` dropped when building the destination.
    pub strip: usize,
}

impl SourceRef {
    /// Destination of this source, optionally with its extension replaced.
    pub fn destination(&self, new_ext: Option<&str>) -> PathBuf {
        let source = match new_ext {
            Some(ext) => self.source.with_extension(ext.trim_start_matches('.')),
            None => self.source.clone(),
        };

        let segments: Vec<Component<'_>> = source
            .components()
            .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
            .collect();
        let keep = segments.len().saturating_sub(self.strip).max(1);
        let tail: PathBuf = segments[segments.len().saturating_sub(keep)..]
            .iter()
            .collect();

        normalize(self.dest_root.join(tail))
    }

    pub fn object(&self) -> PathBuf {
        self.destination(Some("o"))
    }

    pub fn listing(&self) -> PathBuf {
        self.destination(Some("lst"))
    }
}

/// Map one declared source of `ctx.module` for `ctx.variant`.
pub fn resolve_source(ctx: &ModuleContext<'_>, entry: &SourceEntry) -> Result<SourceRef> {
    let base = ctx.module.base_dir();
    match entry {
        SourceEntry::Path(path) => Ok(SourceRef {
            source: join(&base, path),
            dest_root: ctx.output_root()?,
            strip: 0,
        }),
        // A relative destination lives under the variant's output directory.
        SourceEntry::Explicit { path, dest, strip } => Ok(SourceRef {
            source: join(&base, path),
            dest_root: join(ctx.config.output_dir(ctx.variant)?, dest),
            strip: *strip,
        }),
    }
}

/// Where a module-level artifact (`app`, `library`, `hex`, ...) is written.
pub fn artifact_path(ctx: &ModuleContext<'_>, name: &str) -> Result<PathBuf> {
    resolve_source(ctx, &SourceEntry::Path(name.to_string())).map(|r| r.destination(None))
}

pub fn join(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    normalize(base.as_ref().join(path))
}

/// Drop `.` segments and fold `..` into the preceding segment.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        PathBuf::from(".")
    } else {
        out.iter().collect()
    }
}
