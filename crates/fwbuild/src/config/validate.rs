//! Whole-configuration checks, run once after lowering.
//!
//! Everything here is fatal: a project that fails validation never gets a
//! single task submitted.

use super::{BuildConfig, Section, SectionKind};
use crate::error::{Error, Result};
use crate::paths;
use std::collections::BTreeMap;

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        self.check_variants()?;
        self.check_extensions()?;
        for section in [&self.external, &self.source] {
            self.check_section(section)?;
            check_cycles(section)?;
        }
        Ok(())
    }

    fn check_variants(&self) -> Result<()> {
        let mut seen: BTreeMap<_, &str> = BTreeMap::new();
        for variant in &self.variants {
            let dir = paths::normalize(&variant.output_dir);
            if let Some(first) = seen.insert(dir.clone(), &variant.name) {
                return Err(Error::DuplicateOutput {
                    first: first.to_string(),
                    second: variant.name.clone(),
                    dir,
                });
            }
        }

        for name in self.build.iter().chain([&self.external_variant]) {
            self.output_dir(name)?;
        }
        Ok(())
    }

    fn check_extensions(&self) -> Result<()> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (tool, exts) in &self.extensions {
            for ext in exts {
                let ext = ext.trim_start_matches('.');
                if let Some(first) = owners.insert(ext, tool) {
                    if first != tool.as_str() {
                        return Err(Error::DuplicateExtension {
                            extension: ext.to_string(),
                            first: first.to_string(),
                            second: tool.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_section(&self, section: &Section) -> Result<()> {
        for module in section.modules.values() {
            if let Some(arch) = &module.arch {
                if !self.toolchains.contains_key(arch) {
                    return Err(Error::UnknownArchitecture {
                        module: module.name.clone(),
                        arch: arch.clone(),
                    });
                }
            }

            if !module.make.is_empty() && section.kind != SectionKind::External {
                return Err(Error::InvalidModule {
                    module: module.name.clone(),
                    message: "'make' steps are only allowed in the external section".into(),
                });
            }

            for used in &module.uses {
                let target = section.used(module, used)?;
                if target.order > module.order {
                    return Err(Error::InvalidModule {
                        module: module.name.clone(),
                        message: format!(
                            "uses '{used}' (order {}) which is built after it (order {})",
                            target.order, module.order
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over `uses`; reports the first cycle found.
fn check_cycles(section: &Section) -> Result<()> {
    fn visit<'a>(
        section: &'a Section,
        name: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = stack[start..].to_vec();
                cycle.push(name);
                return Err(Error::UsesCycle {
                    section: section.kind.to_string(),
                    cycle: cycle.join(" -> "),
                });
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        stack.push(name);
        if let Some(module) = section.get(name) {
            for used in &module.uses {
                visit(section, used, marks, stack)?;
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    for name in section.modules.keys() {
        visit(section, name, &mut marks, &mut stack)?;
    }
    Ok(())
}
