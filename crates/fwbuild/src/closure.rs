//! Include and define closure over `uses`.
//!
//! Only one level is expanded: a used module contributes its own include
//! directories, its output root and its own defines, but its own `uses` are
//! not followed. Modules that need a deeper chain list it directly.

use crate::config::ModuleContext;
use crate::error::Result;
use crate::paths;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `-I` directories, from `include`.
    Private,
    /// `-isystem` directories, from `sysinclude`.
    System,
}

/// Include directories for compiling `ctx.module`, first occurrence wins.
pub fn collect_includes(ctx: &ModuleContext<'_>, kind: IncludeKind) -> Result<Vec<PathBuf>> {
    let mut dirs = own_includes(ctx, kind);

    for name in &ctx.module.uses {
        let used = ctx.section.used(ctx.module, name)?;
        let used_ctx = ctx.with_module(used);

        dirs.extend(own_includes(&used_ctx, kind));
        if kind == IncludeKind::Private && used.arch.is_some() && used.core.is_some() {
            // Generated headers of the used module live next to its objects.
            dirs.push(paths::join(used_ctx.output_root()?, used.base_dir()));
        }
    }

    let mut seen = std::collections::HashSet::new();
    dirs.retain(|dir| seen.insert(dir.clone()));
    Ok(dirs)
}

fn own_includes(ctx: &ModuleContext<'_>, kind: IncludeKind) -> Vec<PathBuf> {
    let base = ctx.module.base_dir();
    let list = match kind {
        IncludeKind::Private => &ctx.module.include,
        IncludeKind::System => &ctx.module.sysinclude,
    };
    list.iter().map(|dir| paths::join(&base, dir)).collect()
}

/// Per-module compile flags for `tool`: the module's own flags and defines,
/// then the defines of every module it uses.
pub fn module_flags(ctx: &ModuleContext<'_>, tool: &str) -> Result<Vec<String>> {
    let mut flags = ctx.module.options.flags(tool, ctx.variant);
    for name in &ctx.module.uses {
        let used = ctx.section.used(ctx.module, name)?;
        flags.extend(used.options.defines(tool, ctx.variant));
    }
    Ok(flags)
}
