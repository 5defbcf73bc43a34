//! Module build orchestration.
//!
//! Turns one section of the configuration, for one variant, into a complete
//! [`TaskGraph`]:
//!
//! ```text
//! make0 -> make1 -> ... -> compile -> archive | link -> hex -> hex2c
//!                                                    \-> dump
//! ```
//!
//! Modules are planned tier by tier (ascending `order`). Every task of a tier
//! waits on every group emitted by the previous non-empty tier; within a tier
//! only `uses` edges order modules. Nothing is submitted from here, so a
//! fatal configuration error leaves the executor untouched.

use crate::config::{BuildConfig, Module, ModuleContext, Role, Section, SectionKind};
use crate::error::{Error, Result};
use crate::graph::{BuildTask, GroupId, Stage, TaskGraph};
use crate::paths::{self, artifact_path, resolve_source};
use crate::toolchain::{self, Invocation, LinkBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Plan every module of `kind` for `variant`.
pub fn plan_section(config: &BuildConfig, kind: SectionKind, variant: &str) -> Result<TaskGraph> {
    config.output_dir(variant)?;

    let section = config.section(kind);
    let mut planner = Planner {
        config,
        section,
        variant,
        graph: TaskGraph::new(),
    };

    let mut previous_tier: Vec<GroupId> = Vec::new();
    for (order, modules) in tiers(config, section) {
        log::debug!(
            "{kind}/{variant}: tier {order}: {}",
            modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let mut emitted = Vec::new();
        for module in modules {
            emitted.extend(planner.plan_module(module, &previous_tier)?);
        }
        if !emitted.is_empty() {
            previous_tier = emitted;
        }
    }

    planner.graph.verify()?;
    Ok(planner.graph)
}

/// Non-skipped modules grouped by `order`, each tier in `uses` order.
fn tiers<'a>(config: &BuildConfig, section: &'a Section) -> Vec<(i64, Vec<&'a Module>)> {
    let mut by_order: BTreeMap<i64, Vec<&'a Module>> = BTreeMap::new();
    for module in section.modules.values() {
        if config.is_skipped(&module.name) {
            log::info!("Skipping {}", module.name);
            continue;
        }
        by_order.entry(module.order).or_default().push(module);
    }

    by_order
        .into_iter()
        .map(|(order, modules)| (order, dependency_order(section, &modules)))
        .collect()
}

/// Post-order walk over `uses` restricted to `modules`; ties in name order.
fn dependency_order<'a>(section: &'a Section, modules: &[&'a Module]) -> Vec<&'a Module> {
    fn visit<'a>(
        section: &'a Section,
        members: &BTreeSet<&str>,
        module: &'a Module,
        done: &mut BTreeSet<&'a str>,
        out: &mut Vec<&'a Module>,
    ) {
        if !done.insert(module.name.as_str()) {
            return;
        }
        for name in &module.uses {
            if let Some(used) = section.get(name) {
                if members.contains(name.as_str()) {
                    visit(section, members, used, done, out);
                }
            }
        }
        out.push(module);
    }

    let members: BTreeSet<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    let mut done = BTreeSet::new();
    let mut out = Vec::with_capacity(modules.len());
    for module in modules {
        visit(section, &members, module, &mut done, &mut out);
    }
    out
}

struct Planner<'a> {
    config: &'a BuildConfig,
    section: &'a Section,
    variant: &'a str,
    graph: TaskGraph,
}

impl<'a> Planner<'a> {
    fn group(&self, module: &str, stage: Stage) -> GroupId {
        GroupId::new(self.section.kind, self.variant, module, stage)
    }

    /// Group that marks `used` as ready for modules compiling against it.
    fn compile_gate(&self, used: &Module) -> Option<GroupId> {
        if self.config.is_skipped(&used.name) {
            None
        } else if !used.sources.is_empty() {
            Some(self.group(&used.name, Stage::Compile))
        } else {
            used.make
                .len()
                .checked_sub(1)
                .map(|last| self.group(&used.name, Stage::Make(last)))
        }
    }

    fn push(
        &mut self,
        group: &GroupId,
        description: String,
        invocation: Invocation,
        prerequisites: &[GroupId],
        outputs: &[&Path],
    ) {
        let mut output_dirs: Vec<PathBuf> = Vec::new();
        for dir in outputs.iter().filter_map(|p| p.parent()) {
            if !dir.as_os_str().is_empty() && !output_dirs.iter().any(|d| d == dir) {
                output_dirs.push(dir.to_path_buf());
            }
        }

        self.graph.push(BuildTask {
            group: group.clone(),
            description,
            invocation,
            prerequisites: dedup(prerequisites),
            output_dirs,
        });
    }

    /// Plan one module; returns every group it emitted.
    fn plan_module(&mut self, module: &'a Module, tier: &[GroupId]) -> Result<Vec<GroupId>> {
        let config = self.config;
        let ctx = config.context(self.section.kind, module, self.variant);
        let mut emitted = Vec::new();
        let mut ready: Vec<GroupId> = tier.to_vec();

        for (n, command) in module.make.iter().enumerate() {
            let group = self.group(&module.name, Stage::Make(n));
            let (program, args) = command.split_first().ok_or_else(|| Error::InvalidModule {
                module: module.name.clone(),
                message: "make commands must not be empty".into(),
            })?;
            let invocation = Invocation::new(program).args(args);
            self.push(
                &group,
                format!("Making {} [{}]", invocation, module.name),
                invocation,
                &ready,
                &[],
            );
            ready = vec![group.clone()];
            emitted.push(group);
        }

        let objects = self.plan_compiles(&ctx, &ready)?;
        if !objects.is_empty() {
            let compile = self.group(&module.name, Stage::Compile);
            ready = vec![compile.clone()];
            emitted.push(compile);
        }

        match &module.role {
            Some(Role::Library { output }) => {
                emitted.push(self.plan_archive(&ctx, output, &objects, &ready)?);
            }
            Some(Role::Application {
                output,
                map,
                linker_script,
            }) => {
                let app = artifact_path(&ctx, output)?;
                let link = self.plan_link(
                    &ctx,
                    &app,
                    map.as_deref(),
                    linker_script.as_deref(),
                    objects,
                    ready,
                )?;
                emitted.push(link.clone());
                emitted.extend(self.plan_post(&ctx, &app, &link)?);
            }
            // Sub-module objects are picked up by the applications using them.
            Some(Role::SubModule) | None => {}
        }

        log::debug!("planned {} groups for {}", emitted.len(), module.name);
        Ok(emitted)
    }

    /// One compile task per source; returns the objects in source order.
    fn plan_compiles(&mut self, ctx: &ModuleContext<'a>, ready: &[GroupId]) -> Result<Vec<PathBuf>> {
        let module = ctx.module;
        let section = self.section;
        let group = self.group(&module.name, Stage::Compile);

        let mut prerequisites = ready.to_vec();
        for name in &module.uses {
            let used = section.used(module, name)?;
            prerequisites.extend(self.compile_gate(used));
        }

        let mut objects = Vec::with_capacity(module.sources.len());
        for entry in &module.sources {
            let source = resolve_source(ctx, entry)?;
            let invocation = toolchain::compile(ctx, &source)?;
            let object = source.object();
            self.push(
                &group,
                format!("Compiling {} [{}]", source.source.display(), module.name),
                invocation,
                &prerequisites,
                &[&object],
            );
            objects.push(object);
        }
        Ok(objects)
    }

    fn plan_archive(
        &mut self,
        ctx: &ModuleContext<'a>,
        output: &str,
        objects: &[PathBuf],
        ready: &[GroupId],
    ) -> Result<GroupId> {
        let module = ctx.module;
        let library = artifact_path(ctx, output)?;
        let archiver = ctx.toolchain()?.archiver().ok_or_else(|| Error::MissingTool {
            arch: module.arch().unwrap_or_default().to_string(),
            tool: "archiver".into(),
        })?;

        let group = self.group(&module.name, Stage::Archive);
        self.push(
            &group,
            format!("Archiving library {output} of {}", module.name),
            toolchain::archive(archiver, &library, objects),
            ready,
            &[&library],
        );
        Ok(group)
    }

    fn plan_link(
        &mut self,
        ctx: &ModuleContext<'a>,
        app: &Path,
        map: Option<&str>,
        linker_script: Option<&str>,
        mut objects: Vec<PathBuf>,
        mut prerequisites: Vec<GroupId>,
    ) -> Result<GroupId> {
        let module = ctx.module;
        let section = self.section;
        let mut libraries = Vec::new();

        for name in &module.uses {
            let used = section.used(module, name)?;
            let used_ctx = ctx.with_module(used);
            match &used.role {
                Some(Role::SubModule) => {
                    for entry in &used.sources {
                        objects.push(resolve_source(&used_ctx, entry)?.object());
                    }
                    prerequisites.extend(self.compile_gate(used));
                }
                Some(Role::Library { output }) => {
                    libraries.push(artifact_path(&used_ctx, output)?);
                    if !self.config.is_skipped(&used.name) {
                        prerequisites.push(self.group(&used.name, Stage::Archive));
                    }
                }
                Some(Role::Application { .. }) | None => {}
            }
        }

        let toolchain = ctx.toolchain()?;
        let linker = toolchain.linker().ok_or_else(|| Error::MissingTool {
            arch: module.arch().unwrap_or_default().to_string(),
            tool: "linker".into(),
        })?;
        let (driver_flags, link_flags) = toolchain::link_flags(ctx)?;
        let map = map.map(|name| artifact_path(ctx, name)).transpose()?;
        let script = linker_script.map(|script| paths::join(module.base_dir(), script));

        let invocation = LinkBuilder::new(linker)
            .flags(driver_flags)
            .link_flags(link_flags)
            .script(script)
            .objects(objects)
            .libraries(libraries)
            .map(map.clone())
            .build(app);

        let group = self.group(&module.name, Stage::Link);
        let mut outputs = vec![app];
        if let Some(map) = &map {
            outputs.push(map);
        }
        self.push(
            &group,
            format!("Linking application {} of {}", app.display(), module.name),
            invocation,
            &prerequisites,
            &outputs,
        );
        Ok(group)
    }

    fn plan_post(&mut self, ctx: &ModuleContext<'a>, app: &Path, link: &GroupId) -> Result<Vec<GroupId>> {
        let module = ctx.module;
        let post = &module.post;
        let toolchain = ctx.toolchain()?;
        let missing = |tool: &str| Error::MissingTool {
            arch: module.arch().unwrap_or_default().to_string(),
            tool: tool.to_string(),
        };
        let mut emitted = Vec::new();

        let hex_file = match &post.hex {
            Some(hex) => {
                let hex_file = artifact_path(ctx, &hex.output)?;
                let objcopy = toolchain.objcopy().ok_or_else(|| missing("objcopy"))?;
                let group = self.group(&module.name, Stage::Hex);
                self.push(
                    &group,
                    format!("Making {} of {}", hex.output, module.name),
                    toolchain::objcopy(objcopy, &hex.flags, app, &hex_file),
                    std::slice::from_ref(link),
                    &[&hex_file],
                );
                emitted.push(group);
                Some(hex_file)
            }
            None => None,
        };

        if let Some(dump) = &post.dump {
            let dump_file = artifact_path(ctx, &dump.output)?;
            let objdump = toolchain.objdump().ok_or_else(|| missing("objdump"))?;
            let group = self.group(&module.name, Stage::Dump);
            self.push(
                &group,
                format!("Making {} of {}", dump.output, module.name),
                toolchain::objdump(objdump, &dump.flags, app, &dump_file),
                std::slice::from_ref(link),
                &[&dump_file],
            );
            emitted.push(group);
        }

        if let (Some(hex2c), Some(hex_file)) = (&post.hex2c, &hex_file) {
            let c_file = artifact_path(ctx, &hex2c.output)?;
            let converter = self
                .config
                .utilities
                .hex2c
                .clone()
                .ok_or(Error::MissingUtility("hex2c"))?;
            let group = self.group(&module.name, Stage::Hex2c);
            let hex_group = self.group(&module.name, Stage::Hex);
            self.push(
                &group,
                format!("Making {} of {}", hex2c.output, module.name),
                toolchain::hex2c(converter, hex_file, &c_file, &hex2c.flags),
                &[hex_group],
                &[&c_file],
            );
            emitted.push(group);
        }

        Ok(emitted)
    }
}

fn dedup(groups: &[GroupId]) -> Vec<GroupId> {
    let mut out: Vec<GroupId> = Vec::with_capacity(groups.len());
    for group in groups {
        if !out.contains(group) {
            out.push(group.clone());
        }
    }
    out
}
