//! Planning the blinky fixture end to end, without running anything.

mod common;

use common::load_fixture;
use fwbuild::config::SectionKind;
use fwbuild::executor::DryRun;
use fwbuild::orchestrator::plan_section;
use fwbuild::{project, BuildConfig, Error, GroupId, Stage, TaskGraph};
use std::collections::HashSet;

const CORE_OUT: &str = "debug_build/ARM/NXP_LPC11U24";

fn debug_graph(config: &BuildConfig) -> TaskGraph {
    plan_section(config, SectionKind::Source, "debug").unwrap()
}

fn id(module: &str, stage: Stage) -> GroupId {
    GroupId::new(SectionKind::Source, "debug", module, stage)
}

#[test]
fn test_group_order_follows_uses() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);

    let mut groups: Vec<&str> = Vec::new();
    for task in graph.tasks() {
        if groups.last() != Some(&task.group.as_str()) {
            groups.push(task.group.as_str());
        }
    }
    assert_eq!(
        groups,
        vec![
            "source/debug/startup.compile",
            "source/debug/chip.compile",
            "source/debug/chip.archive",
            "source/debug/blinky.compile",
            "source/debug/blinky.link",
            "source/debug/blinky.hex",
            "source/debug/blinky.dump",
            "source/debug/blinky.hex2c",
        ]
    );
}

#[test]
fn test_one_compile_per_source() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);

    for (name, module) in &config.source.modules {
        let compiles = graph.in_group(&id(name, Stage::Compile)).count();
        assert_eq!(compiles, module.sources.len(), "{name}");
    }

    let objects: Vec<&String> = graph
        .tasks()
        .iter()
        .filter(|t| t.group.as_str().ends_with(".compile"))
        .filter_map(|t| t.invocation.args.iter().skip_while(|a| *a != "-o").nth(1))
        .collect();
    let unique: HashSet<&&String> = objects.iter().collect();
    assert_eq!(objects.len(), unique.len());
}

#[test]
fn test_compile_command_line() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);

    let compile = graph
        .in_group(&id("blinky", Stage::Compile))
        .find(|t| t.invocation.args.contains(&"app/blinky.c".to_string()))
        .unwrap();

    assert_eq!(
        compile.invocation.program.to_str(),
        Some("/opt/gcc-arm-none-eabi/bin/arm-none-eabi-gcc")
    );
    let app_out = format!("{CORE_OUT}/app");
    let chip_out = format!("{CORE_OUT}/libs/lpc_chip_11uxx_lib");
    let listing = format!("-Wa,-ahls={CORE_OUT}/app/blinky.lst");
    let object = format!("{CORE_OUT}/app/blinky.o");
    let expected = [
        "-Wall",
        "-std=gnu99",
        "-ffunction-sections",
        "-fdata-sections",
        "-DDEBUG",
        "-mcpu=cortex-m0",
        "-mtune=cortex-m0",
        "-mthumb",
        "-DCORE_M0",
        "-Os",
        "-nostdlib",
        "-DDEBUG_LEDS",
        "-DINCLUDE_ROM_DIV",
        "-I",
        ".",
        "-I",
        app_out.as_str(),
        "-I",
        "libs/lpc_chip_11uxx_lib/inc",
        "-I",
        chip_out.as_str(),
        listing.as_str(),
        "-c",
        "app/blinky.c",
        "-o",
        object.as_str(),
    ];
    assert_eq!(compile.invocation.args, expected);
    assert_eq!(
        compile.prerequisites,
        vec![id("startup", Stage::Compile), id("chip", Stage::Compile)]
    );
}

#[test]
fn test_release_drops_debug_flags() {
    let config = load_fixture("blinky.toml");
    let graph = plan_section(&config, SectionKind::Source, "release").unwrap();

    for task in graph.tasks() {
        assert!(!task.invocation.args.contains(&"-DDEBUG".to_string()));
        assert!(!task.invocation.args.contains(&"-DDEBUG_LEDS".to_string()));
    }

    let link = graph
        .tasks()
        .iter()
        .find(|t| t.group.as_str() == "source/release/blinky.link")
        .unwrap();
    assert!(link.invocation.args.contains(&"-Wl,--relax".to_string()));
}

#[test]
fn test_application_link() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);
    let link = graph.in_group(&id("blinky", Stage::Link)).next().unwrap();

    assert_eq!(
        link.invocation.to_string(),
        format!(
            "/opt/gcc-arm-none-eabi/bin/arm-none-eabi-gcc -nostartfiles -mcpu=cortex-m0 -mthumb \
             -Wl,--gc-sections -T ld/lpc11u24.ld -L ld \
             {CORE_OUT}/app/sysinit.o {CORE_OUT}/app/blinky.o debug_build/out/board/led.o \
             {CORE_OUT}/app/cr_startup_lpc11xx.o {CORE_OUT}/app/vectors.o \
             {CORE_OUT}/libs/lpc_chip_11uxx_lib/libchip.a \
             -Wl,-Map={CORE_OUT}/blinky.map -o {CORE_OUT}/blinky.elf"
        )
    );
    assert_eq!(
        link.prerequisites,
        vec![
            id("blinky", Stage::Compile),
            id("startup", Stage::Compile),
            id("chip", Stage::Archive),
        ]
    );
}

#[test]
fn test_post_processing() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);

    let hex = graph.in_group(&id("blinky", Stage::Hex)).next().unwrap();
    assert_eq!(hex.prerequisites, vec![id("blinky", Stage::Link)]);
    assert_eq!(
        hex.invocation.to_string(),
        format!(
            "/opt/gcc-arm-none-eabi/bin/arm-none-eabi-objcopy -j .text -j .data -O ihex \
             {CORE_OUT}/blinky.elf {CORE_OUT}/blinky.hex"
        )
    );

    let dump = graph.in_group(&id("blinky", Stage::Dump)).next().unwrap();
    assert_eq!(dump.prerequisites, vec![id("blinky", Stage::Link)]);
    assert_eq!(
        dump.invocation.stdout.as_deref(),
        Some(std::path::Path::new(&format!("{CORE_OUT}/blinky.dump")))
    );

    let hex2c = graph.in_group(&id("blinky", Stage::Hex2c)).next().unwrap();
    assert_eq!(hex2c.prerequisites, vec![id("blinky", Stage::Hex)]);
}

#[test]
fn test_explicit_destination() {
    let config = load_fixture("blinky.toml");
    let graph = debug_graph(&config);

    let led = graph
        .in_group(&id("blinky", Stage::Compile))
        .find(|t| t.invocation.args.contains(&"app/board/led.c".to_string()))
        .unwrap();
    assert!(led
        .invocation
        .args
        .ends_with(&["-o".to_string(), "debug_build/out/board/led.o".to_string()]));
    assert_eq!(
        led.output_dirs,
        vec![std::path::PathBuf::from("debug_build/out/board")]
    );
}

fn compile_outputs(graph: &TaskGraph) -> HashSet<String> {
    graph
        .tasks()
        .iter()
        .filter(|t| t.group.as_str().ends_with(".compile"))
        .filter_map(|t| t.invocation.args.iter().skip_while(|a| *a != "-o").nth(1))
        .cloned()
        .collect()
}

#[test]
fn test_variants_compile_to_disjoint_objects() {
    let config = load_fixture("blinky.toml");
    let plan = project::plan(&config, &[]).unwrap();
    assert_eq!(plan.variants.len(), 2);

    let debug = compile_outputs(&plan.variants[0].graph);
    let release = compile_outputs(&plan.variants[1].graph);
    assert_eq!(debug.len(), 11);
    assert_eq!(release.len(), 11);
    assert!(debug.is_disjoint(&release), "{:?}", debug.intersection(&release));
    assert!(release.contains("build/out/board/led.o"));
}

#[test]
#[cfg(unix)]
fn test_shared_absolute_destination_is_fatal() {
    let config = BuildConfig::from_toml(
        r#"
        [variants]
        debug = "debug_build"
        release = "build"

        [toolchains.ARM]
        compilers = { GCC = "gcc" }
        linker = "gcc"

        [extensions]
        GCC = [".c"]

        [source.app]
        arch = "ARM"
        core = "M0"
        app = "app.elf"
        sources = ["main.c", { path = "board/led.c", dest = "/srv/fw/out", strip = 1 }]

        [source.app.tool.GCC]
        "defines:debug" = ["DEBUG_LEDS"]
        "#,
    )
    .unwrap();

    let mut exec = DryRun::new();
    let result = project::plan(&config, &[]).map(|plan| plan.run(&mut exec));
    match result {
        Err(Error::SharedObject {
            first,
            second,
            object,
            ..
        }) => {
            assert_eq!((first.as_str(), second.as_str()), ("debug", "release"));
            assert_eq!(object, std::path::PathBuf::from("/srv/fw/out/led.o"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(exec.tasks().is_empty());

    // A single variant owns the directory on its own.
    assert!(project::plan(&config, &["release".to_string()]).is_ok());
}

#[test]
fn test_project_plan_and_dry_run() {
    let config = load_fixture("blinky.toml");
    let plan = project::plan(&config, &[]).unwrap();

    assert_eq!(plan.external.variant, "release");
    assert_eq!(plan.external.graph.len(), 1);
    assert_eq!(plan.task_count(), 33);

    let mut exec = DryRun::new();
    plan.run(&mut exec).unwrap();
    assert_eq!(exec.tasks().len(), 33);
    assert_eq!(exec.tasks()[0].group.as_str(), "external/release/chip_headers.make0");
    assert_eq!(exec.barriers().len(), 2);
}

#[test]
fn test_graph_serializes() {
    let config = load_fixture("blinky.toml");
    let plan = project::plan(&config, &["debug".to_string()]).unwrap();

    let json = serde_json::to_value(&plan).unwrap();
    let tasks = json["variants"][0]["graph"]["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 16);
    assert_eq!(tasks[0]["group"], "source/debug/startup.compile");
}

#[test]
fn test_duplicate_output_directories_submit_nothing() {
    let result = BuildConfig::from_toml(
        r#"
        [variants]
        debug = "build"
        release = "./build/"
        "#,
    );
    assert!(matches!(result, Err(Error::DuplicateOutput { .. })));
}

#[test]
fn test_fatal_error_submits_nothing() {
    let config = BuildConfig::from_toml(
        r#"
        [variants]
        debug = "build"

        [toolchains.ARM]
        compilers = { GCC = "gcc" }
        linker = "gcc"

        [extensions]
        GCC = [".c"]

        [source.app]
        arch = "ARM"
        core = "M0"
        app = "app.elf"
        sources = ["main.c", "startup.s"]
        "#,
    )
    .unwrap();

    let mut exec = DryRun::new();
    let result = project::plan(&config, &[]).map(|plan| plan.run(&mut exec));
    assert!(matches!(result, Err(Error::NoToolForExtension { .. })));
    assert!(exec.tasks().is_empty());
}

#[test]
fn test_uses_cycle() {
    let err = BuildConfig::from_toml(
        r#"
        [variants]
        debug = "build"

        [source.a]
        uses = ["b"]
        [source.b]
        uses = ["c"]
        [source.c]
        uses = ["a"]
        "#,
    )
    .unwrap_err();

    match err {
        Error::UsesCycle { cycle, .. } => assert_eq!(cycle, "a -> b -> c -> a"),
        other => panic!("unexpected error: {other}"),
    }
}
