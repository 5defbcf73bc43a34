//! Project configuration.
//!
//! A project is described by one TOML file (`fwbuild.toml` by default). It is
//! loaded once, lowered into typed values, validated, and never mutated
//! afterwards. Every resolver takes it by shared reference.

mod module;
mod validate;

pub use module::{Artifact, Module, PostProcess, Role, SourceEntry};

use crate::error::{Error, Result};
use crate::options::OptionTable;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "fwbuild.toml";

/// Option table entry the link step reads its flags from.
pub const LINK_TOOL: &str = "LD";

/// Which table of the project file a module is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Preparatory work, finished before any source module starts.
    External,
    Source,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub modules: BTreeMap<String, Module>,
}

impl Section {
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Look up a module named in `from`'s `uses` list.
    pub fn used(&self, from: &Module, name: &str) -> Result<&Module> {
        self.get(name).ok_or_else(|| Error::UnknownModule {
            section: self.kind.to_string(),
            module: from.name.clone(),
            used: name.to_string(),
        })
    }
}

/// Programs of one architecture's toolchain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Toolchain {
    /// Directory the program names below are found in.
    pub path: Option<PathBuf>,
    /// Launcher placed in front of every compiler invocation (e.g. `ccache`).
    pub prefix: Option<String>,
    #[serde(default)]
    pub compilers: BTreeMap<String, String>,
    pub linker: Option<String>,
    pub archiver: Option<String>,
    pub objcopy: Option<String>,
    pub objdump: Option<String>,
}

impl Toolchain {
    fn program(&self, name: &str) -> PathBuf {
        match &self.path {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn compiler(&self, tool: &str) -> Option<PathBuf> {
        self.compilers.get(tool).map(|name| self.program(name))
    }

    pub fn linker(&self) -> Option<PathBuf> {
        self.linker.as_deref().map(|name| self.program(name))
    }

    pub fn archiver(&self) -> Option<PathBuf> {
        self.archiver.as_deref().map(|name| self.program(name))
    }

    pub fn objcopy(&self) -> Option<PathBuf> {
        self.objcopy.as_deref().map(|name| self.program(name))
    }

    pub fn objdump(&self) -> Option<PathBuf> {
        self.objdump.as_deref().map(|name| self.program(name))
    }
}

/// Helper programs that are not part of a cross toolchain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Utilities {
    pub hex2c: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub name: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    variants: toml::Table,
    #[serde(default)]
    build: Vec<String>,
    external_variant: Option<String>,
    #[serde(default)]
    toolchains: BTreeMap<String, Toolchain>,
    #[serde(default)]
    utilities: Utilities,
    #[serde(default)]
    options: toml::Table,
    #[serde(default)]
    extensions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    skip: BTreeSet<String>,
    #[serde(default)]
    external: BTreeMap<String, module::RawModule>,
    #[serde(default)]
    source: BTreeMap<String, module::RawModule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub variants: Vec<Variant>,
    /// Variants built when none are requested explicitly.
    pub build: Vec<String>,
    pub external_variant: String,
    pub toolchains: BTreeMap<String, Toolchain>,
    pub utilities: Utilities,
    pub options: OptionTable,
    pub extensions: BTreeMap<String, Vec<String>>,
    pub skip: BTreeSet<String>,
    pub external: Section,
    pub source: Section,
}

impl BuildConfig {
    /// Read, lower and validate a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Same as [`BuildConfig::load`] for an in-memory document.
    pub fn from_toml(content: &str) -> Result<Self> {
        Self::parse(content, Path::new(CONFIG_FILE))
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut variants = Vec::with_capacity(raw.variants.len());
        for (name, dir) in &raw.variants {
            let dir = dir.as_str().ok_or_else(|| Error::Parse {
                path: path.to_path_buf(),
                message: format!("variant '{name}' must map to an output directory"),
            })?;
            variants.push(Variant {
                name: name.clone(),
                output_dir: PathBuf::from(dir),
            });
        }

        let build = if raw.build.is_empty() {
            variants.iter().map(|v| v.name.clone()).collect()
        } else {
            raw.build
        };
        let external_variant = match raw.external_variant {
            Some(name) => name,
            None => variants
                .first()
                .map(|v| v.name.clone())
                .ok_or_else(|| Error::Parse {
                    path: path.to_path_buf(),
                    message: "at least one variant must be declared".to_string(),
                })?,
        };

        let config = Self {
            variants,
            build,
            external_variant,
            toolchains: raw.toolchains,
            utilities: raw.utilities,
            options: OptionTable::from_toml(&raw.options)?,
            extensions: raw.extensions,
            skip: raw.skip,
            external: lower_section(SectionKind::External, raw.external)?,
            source: lower_section(SectionKind::Source, raw.source)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::External => &self.external,
            SectionKind::Source => &self.source,
        }
    }

    pub fn output_dir(&self, variant: &str) -> Result<&Path> {
        self.variants
            .iter()
            .find(|v| v.name == variant)
            .map(|v| v.output_dir.as_path())
            .ok_or_else(|| Error::UnknownVariant(variant.to_string()))
    }

    /// Name of the tool that compiles `path`, chosen by file extension.
    pub fn tool_for(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.extensions
            .iter()
            .find(|(_, exts)| exts.iter().any(|e| e.trim_start_matches('.') == ext))
            .map(|(tool, _)| tool.as_str())
    }

    pub fn is_skipped(&self, module: &str) -> bool {
        self.skip.contains(module)
    }

    /// Everything a resolver needs to work on one module in one variant.
    pub fn context<'a>(
        &'a self,
        kind: SectionKind,
        module: &'a Module,
        variant: &'a str,
    ) -> ModuleContext<'a> {
        ModuleContext {
            config: self,
            section: self.section(kind),
            module,
            variant,
        }
    }
}

fn lower_section(
    kind: SectionKind,
    raw: BTreeMap<String, module::RawModule>,
) -> Result<Section> {
    let modules = raw
        .into_iter()
        .map(|(name, raw)| Module::lower(&name, raw).map(|m| (name, m)))
        .collect::<Result<BTreeMap<_, _>>>()?;
    Ok(Section { kind, modules })
}

#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub config: &'a BuildConfig,
    pub section: &'a Section,
    pub module: &'a Module,
    pub variant: &'a str,
}

impl<'a> ModuleContext<'a> {
    /// The same section and variant, focused on another module.
    pub fn with_module(&self, module: &'a Module) -> Self {
        Self { module, ..*self }
    }

    pub fn toolchain(&self) -> Result<&'a Toolchain> {
        let arch = self.module.arch()?;
        self.config
            .toolchains
            .get(arch)
            .ok_or_else(|| Error::UnknownArchitecture {
                module: self.module.name.clone(),
                arch: arch.to_string(),
            })
    }

    /// `<variant output>/<arch>/<core>`: where bare sources build to.
    pub fn output_root(&self) -> Result<PathBuf> {
        let dir = self.config.output_dir(self.variant)?;
        Ok(paths::normalize(
            dir.join(self.module.arch()?).join(self.module.core()?),
        ))
    }
}
