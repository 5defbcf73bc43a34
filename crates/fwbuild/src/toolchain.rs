//! Toolchain command lines.
//!
//! Builders in here only assemble argument vectors; nothing is spawned. The
//! resulting [`Invocation`] is what a task carries to the executor.

use crate::closure::{self, IncludeKind};
use crate::config::{ModuleContext, LINK_TOOL};
use crate::error::{Error, Result};
use crate::paths::SourceRef;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One program run: argv plus an optional file that receives its stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Redirect stdout into `file`.
    pub fn capture(mut self, file: PathBuf) -> Self {
        self.stdout = Some(file);
        self
    }

    /// A `Command` ready to spawn (stdout redirection is left to the caller).
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(out) = &self.stdout {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

/// Compiler command builder.
#[derive(Debug, Clone)]
pub struct CompileBuilder {
    launcher: Option<String>,
    compiler: PathBuf,
    flags: Vec<String>,
    includes: Vec<PathBuf>,
    system_includes: Vec<PathBuf>,
    listing: Option<(String, PathBuf)>,
}

impl CompileBuilder {
    pub fn new(compiler: PathBuf) -> Self {
        Self {
            launcher: None,
            compiler,
            flags: Vec::new(),
            includes: Vec::new(),
            system_includes: Vec::new(),
            listing: None,
        }
    }

    /// Run the compiler through `launcher` (e.g. `ccache`).
    pub fn launcher(mut self, launcher: Option<&str>) -> Self {
        self.launcher = launcher.map(str::to_string);
        self
    }

    pub fn flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn includes(mut self, dirs: Vec<PathBuf>) -> Self {
        self.includes = dirs;
        self
    }

    pub fn system_includes(mut self, dirs: Vec<PathBuf>) -> Self {
        self.system_includes = dirs;
        self
    }

    /// Ask the assembler for a listing, e.g. `-Wa,-ahls=<file>`.
    pub fn listing(mut self, option: &str, file: PathBuf) -> Self {
        self.listing = Some((option.to_string(), file));
        self
    }

    pub fn build(self, source: &Path, object: &Path) -> Invocation {
        let mut inv = match self.launcher {
            Some(launcher) => Invocation::new(launcher).path(&self.compiler),
            None => Invocation::new(self.compiler),
        };

        inv = inv.args(&self.flags);
        for dir in &self.includes {
            inv = inv.arg("-I").path(dir);
        }
        for dir in &self.system_includes {
            inv = inv.arg("-isystem").path(dir);
        }
        if let Some((option, file)) = &self.listing {
            inv = inv.arg(format!("-Wa,{option}={}", file.display()));
        }

        inv.arg("-c").path(source).arg("-o").path(object)
    }
}

/// Linker command builder.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    linker: PathBuf,
    flags: Vec<String>,
    link_flags: Vec<String>,
    script: Option<PathBuf>,
    objects: Vec<PathBuf>,
    libraries: Vec<PathBuf>,
    map: Option<PathBuf>,
}

impl LinkBuilder {
    pub fn new(linker: PathBuf) -> Self {
        Self {
            linker,
            flags: Vec::new(),
            link_flags: Vec::new(),
            script: None,
            objects: Vec::new(),
            libraries: Vec::new(),
            map: None,
        }
    }

    /// Driver flags, passed as they are.
    pub fn flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }

    /// Raw linker flags, passed through the driver with `-Wl,`.
    pub fn link_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.link_flags.extend(flags);
        self
    }

    pub fn script(mut self, script: Option<PathBuf>) -> Self {
        self.script = script;
        self
    }

    pub fn objects(mut self, objects: impl IntoIterator<Item = PathBuf>) -> Self {
        self.objects.extend(objects);
        self
    }

    pub fn libraries(mut self, libraries: impl IntoIterator<Item = PathBuf>) -> Self {
        self.libraries.extend(libraries);
        self
    }

    pub fn map(mut self, map: Option<PathBuf>) -> Self {
        self.map = map;
        self
    }

    pub fn build(self, output: &Path) -> Invocation {
        let mut inv = Invocation::new(self.linker).args(&self.flags);
        inv = inv.args(self.link_flags.iter().map(|f| format!("-Wl,{f}")));

        if let Some(script) = &self.script {
            inv = inv.arg("-T").path(script);
            let dir = script.parent().filter(|d| !d.as_os_str().is_empty());
            inv = inv.arg("-L").path(dir.unwrap_or(Path::new(".")));
        }

        for object in self.objects.iter().chain(&self.libraries) {
            inv = inv.path(object);
        }
        if let Some(map) = &self.map {
            inv = inv.arg(format!("-Wl,-Map={}", map.display()));
        }

        inv.arg("-o").path(output)
    }
}

/// `ar rcs <library> <objects...>`
pub fn archive(archiver: PathBuf, library: &Path, objects: &[PathBuf]) -> Invocation {
    let mut inv = Invocation::new(archiver).arg("rcs").path(library);
    for object in objects {
        inv = inv.path(object);
    }
    inv
}

/// `objcopy <flags> <app> <hex>`
pub fn objcopy(objcopy: PathBuf, flags: &[String], app: &Path, hex: &Path) -> Invocation {
    Invocation::new(objcopy).args(flags).path(app).path(hex)
}

/// `objdump <flags> <app> > <dump>`
pub fn objdump(objdump: PathBuf, flags: &[String], app: &Path, dump: &Path) -> Invocation {
    Invocation::new(objdump)
        .args(flags)
        .path(app)
        .capture(dump.to_path_buf())
}

/// `hex2c <hex> <c-file> <flags>`
pub fn hex2c(converter: PathBuf, hex: &Path, c_file: &Path, flags: &[String]) -> Invocation {
    Invocation::new(converter).path(hex).path(c_file).args(flags)
}

/// Full compile invocation for one source of `ctx.module`.
pub fn compile(ctx: &ModuleContext<'_>, source: &SourceRef) -> Result<Invocation> {
    let module = ctx.module;
    let tool = ctx
        .config
        .tool_for(&source.source)
        .ok_or_else(|| Error::NoToolForExtension {
            module: module.name.clone(),
            source_path: source.source.clone(),
        })?;

    let arch = module.arch()?;
    let toolchain = ctx.toolchain()?;
    let compiler = toolchain.compiler(tool).ok_or_else(|| Error::MissingTool {
        arch: arch.to_string(),
        tool: tool.to_string(),
    })?;

    let mut builder = CompileBuilder::new(compiler)
        .launcher(toolchain.prefix.as_deref())
        .flags(ctx.config.options.compile_flags(tool, arch, ctx.variant, module.core()?))
        .flags(closure::module_flags(ctx, tool)?)
        .includes(closure::collect_includes(ctx, IncludeKind::Private)?)
        .system_includes(closure::collect_includes(ctx, IncludeKind::System)?);
    if let Some(option) = &module.listing {
        builder = builder.listing(option, source.listing());
    }

    Ok(builder.build(&source.source, &source.object()))
}

/// Driver and raw linker flags for linking `ctx.module`.
pub fn link_flags(ctx: &ModuleContext<'_>) -> Result<(Vec<String>, Vec<String>)> {
    let module = ctx.module;
    let arch = module.arch()?;

    let mut driver = ctx
        .config
        .options
        .compile_flags(LINK_TOOL, arch, ctx.variant, module.core()?);
    driver.extend(closure::module_flags(ctx, LINK_TOOL)?);

    let mut raw = ctx.config.options.link_flags(LINK_TOOL, arch, ctx.variant);
    raw.extend(module.ldflags.iter().cloned());
    Ok((driver, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, SectionKind};
    use crate::paths::resolve_source;

    const PROJECT: &str = r#"
        [variants]
        debug = "debug_build"

        [toolchains.ARM]
        path = "/opt/arm/bin"
        prefix = "ccache"
        compilers = { GCC = "arm-none-eabi-gcc" }

        [extensions]
        GCC = [".c"]

        [options.GCC]
        warnings = ["-Wall"]
        [options.GCC.arch.ARM]
        cflags = ["-mthumb"]

        ["options"."GCC:LD".arch.ARM]
        ldflags = ["--gc-sections"]

        [source.app]
        base_dir = "fw"
        arch = "ARM"
        core = "M0"
        listing = "-ahls"
        include = ["inc"]
        ldflags = ["--relax"]
        sources = ["main.c", "boot.s"]
    "#;

    #[test]
    fn test_compile_argument_order() {
        let config = BuildConfig::from_toml(PROJECT).unwrap();
        let app = config.source.get("app").unwrap();
        let ctx = config.context(SectionKind::Source, app, "debug");
        let src = resolve_source(&ctx, &app.sources[0]).unwrap();

        let inv = compile(&ctx, &src).unwrap();
        assert_eq!(inv.program, PathBuf::from("ccache"));
        assert_eq!(
            inv.args,
            vec![
                "/opt/arm/bin/arm-none-eabi-gcc",
                "-Wall",
                "-mthumb",
                "-I",
                "fw/inc",
                "-Wa,-ahls=debug_build/ARM/M0/fw/main.lst",
                "-c",
                "fw/main.c",
                "-o",
                "debug_build/ARM/M0/fw/main.o",
            ]
        );
    }

    #[test]
    fn test_unknown_extension_is_fatal() {
        let config = BuildConfig::from_toml(PROJECT).unwrap();
        let app = config.source.get("app").unwrap();
        let ctx = config.context(SectionKind::Source, app, "debug");
        let src = resolve_source(&ctx, &app.sources[1]).unwrap();

        assert!(matches!(
            compile(&ctx, &src),
            Err(Error::NoToolForExtension { .. })
        ));
    }

    #[test]
    fn test_link_flags() {
        let config = BuildConfig::from_toml(PROJECT).unwrap();
        let app = config.source.get("app").unwrap();
        let ctx = config.context(SectionKind::Source, app, "debug");

        let (driver, raw) = link_flags(&ctx).unwrap();
        assert!(driver.is_empty());
        assert_eq!(raw, vec!["--gc-sections", "--relax"]);
    }

    #[test]
    fn test_link_builder() {
        let inv = LinkBuilder::new(PathBuf::from("arm-none-eabi-gcc"))
            .flags(vec!["-nostartfiles".to_string()])
            .link_flags(vec!["--gc-sections".to_string()])
            .script(Some(PathBuf::from("ld/lpc11u24.ld")))
            .objects(vec![PathBuf::from("a.o"), PathBuf::from("b.o")])
            .libraries(vec![PathBuf::from("libchip.a")])
            .map(Some(PathBuf::from("app.map")))
            .build(Path::new("app.elf"));

        assert_eq!(
            inv.to_string(),
            "arm-none-eabi-gcc -nostartfiles -Wl,--gc-sections -T ld/lpc11u24.ld -L ld \
             a.o b.o libchip.a -Wl,-Map=app.map -o app.elf"
        );
    }

    #[test]
    fn test_archive_and_post_steps() {
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let ar = archive(PathBuf::from("ar"), Path::new("libx.a"), &objects);
        assert_eq!(ar.to_string(), "ar rcs libx.a a.o b.o");

        let flags = vec!["-O".to_string(), "ihex".to_string()];
        let hex = objcopy(PathBuf::from("objcopy"), &flags, Path::new("a.elf"), Path::new("a.hex"));
        assert_eq!(hex.to_string(), "objcopy -O ihex a.elf a.hex");

        let dump = objdump(
            PathBuf::from("objdump"),
            &["-xdSs".to_string()],
            Path::new("a.elf"),
            Path::new("a.dump"),
        );
        assert_eq!(dump.stdout, Some(PathBuf::from("a.dump")));
        assert_eq!(dump.to_string(), "objdump -xdSs a.elf > a.dump");
    }
}
