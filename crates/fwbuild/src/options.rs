//! Option merge engine.
//!
//! The `[options]` tree of a project file is lowered once, at load time, into
//! an [`OptionTable`]: an ordered list of rules keyed by tool set, scope
//! (tool-wide or per architecture), flag kind and optional variant. Flag
//! resolution walks that table with a single precedence order:
//!
//! 1. warnings
//! 2. general compile flags
//! 3. defines (each rendered as `-D...`)
//! 4. architecture compile flags
//! 5. flags keyed by the core/device identifier
//!
//! Every step emits the variant-independent entry first and its
//! `<key>:<variant>` sibling right after it. Variant flags extend, they never
//! replace.

use crate::error::{Error, Result};
use serde::Serialize;

/// A tool-set key such as `GCC` or `GCC:GXX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolMatcher(String);

impl ToolMatcher {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// True if `tool` is the key itself or one of its `:`-separated members.
    pub fn matches(&self, tool: &str) -> bool {
        self.0 == tool || self.0.split(':').any(|member| member == tool)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FlagKind {
    Warnings,
    CompileFlags,
    LinkFlags,
    Defines,
    /// Flags that only apply to one core/device identifier.
    Core(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Scope {
    Tool,
    Arch(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionRule {
    pub scope: Scope,
    pub kind: FlagKind,
    pub variant: Option<String>,
    pub flags: Vec<String>,
}

/// All rules declared under one tool-set key.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOptions {
    pub tools: ToolMatcher,
    pub arches: Vec<String>,
    pub rules: Vec<OptionRule>,
}

impl ToolOptions {
    fn declares_arch(&self, arch: &str) -> bool {
        self.arches.iter().any(|a| a == arch)
    }

    /// Base entry followed by its variant sibling.
    fn fetch(&self, scope: &Scope, kind: &FlagKind, variant: &str, out: &mut Vec<String>) {
        let base = self
            .rules
            .iter()
            .filter(|r| &r.scope == scope && &r.kind == kind && r.variant.is_none());
        let specific = self.rules.iter().filter(|r| {
            &r.scope == scope && &r.kind == kind && r.variant.as_deref() == Some(variant)
        });

        for rule in base.chain(specific) {
            if *kind == FlagKind::Defines {
                out.extend(rule.flags.iter().map(String::as_str).map(define_flag));
            } else {
                out.extend(rule.flags.iter().cloned());
            }
        }
    }
}

/// Typed form of the `[options]` tree, in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptionTable {
    entries: Vec<ToolOptions>,
}

impl OptionTable {
    fn matching<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a ToolOptions> + 'a {
        self.entries.iter().filter(move |e| e.tools.matches(tool))
    }

    /// Flags for compiling with `tool` on `arch`/`core` in `variant`.
    pub fn compile_flags(&self, tool: &str, arch: &str, variant: &str, core: &str) -> Vec<String> {
        let mut flags = Vec::new();

        for entry in self.matching(tool) {
            entry.fetch(&Scope::Tool, &FlagKind::Warnings, variant, &mut flags);
            entry.fetch(&Scope::Tool, &FlagKind::CompileFlags, variant, &mut flags);
            entry.fetch(&Scope::Tool, &FlagKind::Defines, variant, &mut flags);

            if entry.declares_arch(arch) {
                let scope = Scope::Arch(arch.to_string());
                entry.fetch(&scope, &FlagKind::CompileFlags, variant, &mut flags);
                entry.fetch(&scope, &FlagKind::Core(core.to_string()), variant, &mut flags);
            } else {
                log::warn!(
                    "options '{}' have no entry for architecture {arch}; {tool} will build without architecture flags",
                    entry.tools.as_str()
                );
            }
        }

        flags
    }

    /// Raw linker flags (not yet `-Wl,` wrapped) for `tool` on `arch`.
    pub fn link_flags(&self, tool: &str, arch: &str, variant: &str) -> Vec<String> {
        let mut flags = Vec::new();

        for entry in self.matching(tool) {
            entry.fetch(&Scope::Tool, &FlagKind::LinkFlags, variant, &mut flags);

            if entry.declares_arch(arch) {
                let scope = Scope::Arch(arch.to_string());
                entry.fetch(&scope, &FlagKind::LinkFlags, variant, &mut flags);
            } else {
                log::warn!(
                    "options '{}' have no entry for architecture {arch}; linking without architecture flags",
                    entry.tools.as_str()
                );
            }
        }

        flags
    }

    /// Lower the raw `[options]` table.
    pub fn from_toml(table: &toml::Table) -> Result<Self> {
        let mut entries = Vec::with_capacity(table.len());

        for (key, value) in table {
            let body = value.as_table().ok_or_else(|| invalid(key, "expected a table"))?;
            let mut options = ToolOptions {
                tools: ToolMatcher::new(key.clone()),
                arches: Vec::new(),
                rules: Vec::new(),
            };

            for (name, value) in body {
                if name == "arch" {
                    let arches = value
                        .as_table()
                        .ok_or_else(|| invalid(key, "'arch' must be a table"))?;
                    for (arch, arch_body) in arches {
                        lower_arch(key, arch, arch_body, &mut options)?;
                    }
                    continue;
                }

                let (base, variant) = split_variant(name);
                let kind = match base {
                    "warnings" => FlagKind::Warnings,
                    "cflags" => FlagKind::CompileFlags,
                    "ldflags" => FlagKind::LinkFlags,
                    "defines" => FlagKind::Defines,
                    other => return Err(invalid(key, &format!("unknown option '{other}'"))),
                };
                options.rules.push(OptionRule {
                    scope: Scope::Tool,
                    kind,
                    variant,
                    flags: string_list(key, name, value)?,
                });
            }

            entries.push(options);
        }

        Ok(Self { entries })
    }
}

fn lower_arch(key: &str, arch: &str, body: &toml::Value, options: &mut ToolOptions) -> Result<()> {
    let body = body
        .as_table()
        .ok_or_else(|| invalid(key, &format!("arch '{arch}' must be a table")))?;

    options.arches.push(arch.to_string());
    for (name, value) in body {
        let (base, variant) = split_variant(name);
        let kind = match base {
            "cflags" => FlagKind::CompileFlags,
            "ldflags" => FlagKind::LinkFlags,
            core => FlagKind::Core(core.to_string()),
        };
        options.rules.push(OptionRule {
            scope: Scope::Arch(arch.to_string()),
            kind,
            variant,
            flags: string_list(key, name, value)?,
        });
    }
    Ok(())
}

/// Per-module `[<section>.<module>.tool.<TOOLSET>]` overrides.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleOptions {
    entries: Vec<ToolOptions>,
}

impl ModuleOptions {
    /// Module flags then module defines for `tool`.
    pub fn flags(&self, tool: &str, variant: &str) -> Vec<String> {
        let mut out = Vec::new();
        for entry in self.entries.iter().filter(|e| e.tools.matches(tool)) {
            entry.fetch(&Scope::Tool, &FlagKind::CompileFlags, variant, &mut out);
            entry.fetch(&Scope::Tool, &FlagKind::Defines, variant, &mut out);
        }
        out
    }

    /// Only the defines, as contributed to modules that use this one.
    pub fn defines(&self, tool: &str, variant: &str) -> Vec<String> {
        let mut out = Vec::new();
        for entry in self.entries.iter().filter(|e| e.tools.matches(tool)) {
            entry.fetch(&Scope::Tool, &FlagKind::Defines, variant, &mut out);
        }
        out
    }

    pub fn from_toml(table: &toml::Table) -> Result<Self> {
        let mut entries = Vec::with_capacity(table.len());

        for (key, value) in table {
            let body = value.as_table().ok_or_else(|| invalid(key, "expected a table"))?;
            let mut rules = Vec::new();
            for (name, value) in body {
                let (base, variant) = split_variant(name);
                let kind = match base {
                    "flags" => FlagKind::CompileFlags,
                    "defines" => FlagKind::Defines,
                    other => return Err(invalid(key, &format!("unknown module option '{other}'"))),
                };
                rules.push(OptionRule {
                    scope: Scope::Tool,
                    kind,
                    variant,
                    flags: string_list(key, name, value)?,
                });
            }
            entries.push(ToolOptions {
                tools: ToolMatcher::new(key.clone()),
                arches: Vec::new(),
                rules,
            });
        }

        Ok(Self { entries })
    }
}

/// `NAME=VALUE` becomes `-DNAME=VALUE`; already prefixed entries pass through.
pub fn define_flag(define: &str) -> String {
    if define.starts_with("-D") {
        define.to_string()
    } else {
        format!("-D{define}")
    }
}

fn split_variant(name: &str) -> (&str, Option<String>) {
    match name.split_once(':') {
        Some((base, variant)) => (base, Some(variant.to_string())),
        None => (name, None),
    }
}

fn string_list(key: &str, name: &str, value: &toml::Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(key, &format!("'{name}' must be a list of strings")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(key, &format!("'{name}' must be a list of strings")))
        })
        .collect()
}

fn invalid(key: &str, message: &str) -> Error {
    Error::InvalidOption {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> OptionTable {
        let raw: toml::Table = toml::from_str(src).unwrap();
        OptionTable::from_toml(&raw).unwrap()
    }

    #[test]
    fn test_tool_matcher_membership() {
        let m = ToolMatcher::new("GCC:GXX");
        assert!(m.matches("GCC"));
        assert!(m.matches("GXX"));
        assert!(m.matches("GCC:GXX"));
        assert!(!m.matches("GAS"));
        assert!(!m.matches("GC"));
    }

    #[test]
    fn test_variant_flags_follow_base_flags() {
        let t = table(
            r#"
            [GCC]
            warnings = ["-Wall"]
            cflags = ["-std=c99"]
            "cflags:debug" = ["-DDEBUG"]
            [GCC.arch.ARM]
            "#,
        );

        assert_eq!(
            t.compile_flags("GCC", "ARM", "debug", "M0"),
            vec!["-Wall", "-std=c99", "-DDEBUG"]
        );
        assert_eq!(t.compile_flags("GCC", "ARM", "release", "M0"), vec!["-Wall", "-std=c99"]);
    }

    #[test]
    fn test_full_precedence_order() {
        let t = table(
            r#"
            [GCC]
            "defines:debug" = ["TRACE"]
            defines = ["CORE_M0"]
            cflags = ["-Os"]
            warnings = ["-Wall"]
            [GCC.arch.ARM]
            LPC11U24 = ["-mcpu=cortex-m0"]
            "cflags:debug" = ["-g3"]
            cflags = ["-mthumb"]
            "#,
        );

        assert_eq!(
            t.compile_flags("GCC", "ARM", "debug", "LPC11U24"),
            vec![
                "-Wall",
                "-Os",
                "-DCORE_M0",
                "-DTRACE",
                "-mthumb",
                "-g3",
                "-mcpu=cortex-m0"
            ]
        );
    }

    #[test]
    fn test_unknown_arch_degrades() {
        let t = table(
            r#"
            [GCC]
            warnings = ["-Wall"]
            [GCC.arch.AVR]
            cflags = ["-mmcu=atmega328p"]
            "#,
        );

        assert_eq!(t.compile_flags("GCC", "ARM", "release", "M0"), vec!["-Wall"]);
    }

    #[test]
    fn test_shared_key_serves_every_member() {
        let t = table(
            r#"
            [GCC]
            warnings = ["-Wall"]
            [GXX]
            warnings = ["-Wno-reorder"]
            ["GCC:GXX"]
            cflags = ["-ffunction-sections"]
            "#,
        );

        assert_eq!(
            t.compile_flags("GXX", "ARM", "release", "M0"),
            vec!["-Wno-reorder", "-ffunction-sections"]
        );
        assert_eq!(
            t.compile_flags("GCC", "ARM", "release", "M0"),
            vec!["-Wall", "-ffunction-sections"]
        );
    }

    #[test]
    fn test_link_flags_only_ldflags_family() {
        let t = table(
            r#"
            ["GCC:LD"]
            warnings = ["-Wall"]
            ldflags = ["--gc-sections"]
            [ "GCC:LD".arch.ARM ]
            cflags = ["-mthumb"]
            ldflags = ["--relax"]
            "ldflags:debug" = ["--print-memory-usage"]
            "#,
        );

        assert_eq!(
            t.link_flags("LD", "ARM", "debug"),
            vec!["--gc-sections", "--relax", "--print-memory-usage"]
        );
    }

    #[test]
    fn test_rejects_unknown_option() {
        let raw: toml::Table = toml::from_str("[GCC]\ncflag = [\"-O2\"]").unwrap();
        let err = OptionTable::from_toml(&raw).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }

    #[test]
    fn test_module_options() {
        let raw: toml::Table = toml::from_str(
            r#"
            [GCC]
            flags = ["-Os"]
            defines = ["F_CPU=8000000"]
            "defines:debug" = ["-DDEBUG"]
            "#,
        )
        .unwrap();
        let m = ModuleOptions::from_toml(&raw).unwrap();

        assert_eq!(m.flags("GCC", "debug"), vec!["-Os", "-DF_CPU=8000000", "-DDEBUG"]);
        assert_eq!(m.defines("GCC", "release"), vec!["-DF_CPU=8000000"]);
        assert!(m.flags("GXX", "debug").is_empty());
    }
}
