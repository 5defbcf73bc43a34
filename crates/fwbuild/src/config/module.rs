//! Module declarations.
//!
//! A module is read from TOML as a flat table of optional keys and lowered
//! into [`Module`], where the role and the post-processing steps are typed.

use crate::error::{Error, Result};
use crate::options::ModuleOptions;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_order() -> i64 {
    1
}

/// One entry of a module's `sources` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    /// Built under the variant's default output root.
    Path(String),
    /// Built under `dest`, dropping `strip` leading segments. A relative
    /// `dest` is taken from the variant's output directory.
    Explicit {
        path: String,
        dest: String,
        #[serde(default)]
        strip: usize,
    },
}

impl SourceEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) | Self::Explicit { path, .. } => path,
        }
    }
}

/// Module as written in the project file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawModule {
    #[serde(default)]
    version: String,
    base_dir: Option<String>,
    prefix: Option<String>,
    arch: Option<String>,
    core: Option<String>,
    #[serde(default = "default_order")]
    order: i64,
    #[serde(default)]
    sources: Vec<SourceEntry>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    sysinclude: Vec<String>,
    #[serde(default)]
    uses: Vec<String>,
    listing: Option<String>,
    #[serde(default)]
    tool: toml::Table,
    #[serde(default)]
    ldflags: Vec<String>,

    app: Option<String>,
    map: Option<String>,
    linker_script: Option<String>,
    library: Option<String>,
    #[serde(default)]
    submodule: bool,

    hex: Option<String>,
    #[serde(default)]
    hex_flags: Vec<String>,
    dump: Option<String>,
    #[serde(default)]
    dump_flags: Vec<String>,
    hex2c: Option<String>,
    #[serde(default)]
    hex2c_flags: Vec<String>,

    #[serde(default)]
    make: Vec<Vec<String>>,
}

/// What a module turns into once its sources are compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Application {
        output: String,
        map: Option<String>,
        linker_script: Option<String>,
    },
    Library {
        output: String,
    },
    /// Objects are linked directly into every application that uses it.
    SubModule,
}

/// An artifact name plus the flags passed to the tool that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub output: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostProcess {
    pub hex: Option<Artifact>,
    pub dump: Option<Artifact>,
    pub hex2c: Option<Artifact>,
}

impl PostProcess {
    pub fn is_empty(&self) -> bool {
        self.hex.is_none() && self.dump.is_none() && self.hex2c.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub base_dir: Option<String>,
    pub prefix: Option<String>,
    pub arch: Option<String>,
    pub core: Option<String>,
    pub order: i64,
    pub sources: Vec<SourceEntry>,
    pub include: Vec<String>,
    pub sysinclude: Vec<String>,
    pub uses: Vec<String>,
    pub listing: Option<String>,
    pub options: ModuleOptions,
    pub ldflags: Vec<String>,
    pub role: Option<Role>,
    pub post: PostProcess,
    pub make: Vec<Vec<String>>,
}

impl Module {
    pub(super) fn lower(name: &str, raw: RawModule) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidModule {
            module: name.to_string(),
            message: message.to_string(),
        };

        let mut roles = Vec::new();
        if raw.app.is_some() {
            roles.push("app");
        }
        if raw.library.is_some() {
            roles.push("library");
        }
        if raw.submodule {
            roles.push("submodule");
        }
        if roles.len() > 1 {
            return Err(Error::ConflictingRoles {
                module: name.to_string(),
                roles: roles.join(", "),
            });
        }

        let links_extras = raw.map.is_some() || raw.linker_script.is_some();
        let role = match (raw.app, raw.library, raw.submodule) {
            (Some(output), _, _) => Some(Role::Application {
                output,
                map: raw.map,
                linker_script: raw.linker_script,
            }),
            (None, Some(output), _) => Some(Role::Library { output }),
            (None, None, true) => Some(Role::SubModule),
            (None, None, false) => None,
        };
        if links_extras && !matches!(role, Some(Role::Application { .. })) {
            return Err(invalid("'map' and 'linker_script' need an 'app'"));
        }

        let post = PostProcess {
            hex: raw.hex.map(|output| Artifact {
                output,
                flags: raw.hex_flags,
            }),
            dump: raw.dump.map(|output| Artifact {
                output,
                flags: raw.dump_flags,
            }),
            hex2c: raw.hex2c.map(|output| Artifact {
                output,
                flags: raw.hex2c_flags,
            }),
        };
        if !post.is_empty() && !matches!(role, Some(Role::Application { .. })) {
            return Err(invalid("hex, dump and hex2c need an 'app' to work from"));
        }
        if post.hex2c.is_some() && post.hex.is_none() {
            return Err(invalid("hex2c converts the hex image, declare 'hex' too"));
        }

        if raw.make.iter().any(Vec::is_empty) {
            return Err(invalid("make commands must not be empty"));
        }
        if !raw.sources.is_empty() && (raw.arch.is_none() || raw.core.is_none()) {
            return Err(invalid("modules with sources need 'arch' and 'core'"));
        }

        Ok(Self {
            name: name.to_string(),
            version: raw.version,
            base_dir: raw.base_dir,
            prefix: raw.prefix,
            arch: raw.arch,
            core: raw.core,
            order: raw.order,
            sources: raw.sources,
            include: raw.include,
            sysinclude: raw.sysinclude,
            uses: raw.uses,
            listing: raw.listing,
            options: ModuleOptions::from_toml(&raw.tool)?,
            ldflags: raw.ldflags,
            role,
            post,
            make: raw.make,
        })
    }

    /// `prefix/base_dir`, where the base directory defaults to the version.
    pub fn base_dir(&self) -> PathBuf {
        let base = self.base_dir.as_deref().unwrap_or(&self.version);
        match self.prefix.as_deref() {
            Some(prefix) => paths::join(prefix, base),
            None => paths::normalize(base),
        }
    }

    pub fn arch(&self) -> Result<&str> {
        self.arch.as_deref().ok_or_else(|| self.missing("arch"))
    }

    pub fn core(&self) -> Result<&str> {
        self.core.as_deref().ok_or_else(|| self.missing("core"))
    }

    fn missing(&self, key: &str) -> Error {
        Error::InvalidModule {
            module: self.name.clone(),
            message: format!("no '{key}' declared"),
        }
    }
}
