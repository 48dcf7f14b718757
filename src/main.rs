// Fri Oct 16 2026 - Alex

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use layout_finder::{
    config::AnalysisConfig,
    context::AnalysisContext,
    memory::{Address, AddressSpace, ImageMemory, ProcessMemory, Protection},
    module::{ModuleInfo, ModuleMap},
    structure::{
        ComparisonResult, DiscoveredLayout, LayoutComparator, MemoryAnalyzer, PatternRecognizer, SchemaLibrary,
        TypeInference, VTableDetector,
    },
    utils::{self, logging},
    validation::PointerValidator,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "layout-finder")]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Infers and checks in-memory struct layouts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Repeat for more detail (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON file overriding analysis bounds.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the result as JSON.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk a struct and report its discovered fields.
    Analyze(AnalyzeArgs),
    /// Report padding runs and repeating arrays in a range.
    Patterns(RangeArgs),
    /// Check whether an object starts with a vtable pointer.
    Vtable(ObjectArgs),
    /// Show every reading of up to 8 bytes.
    Interpret(InterpretArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Live process to read.
    #[arg(long, conflicts_with = "dump")]
    pid: Option<i32>,

    /// Raw memory dump to read instead of a live process.
    #[arg(long, requires = "base")]
    dump: Option<PathBuf>,

    /// Address the dump was captured at.
    #[arg(long, value_parser = parse_addr)]
    base: Option<u64>,

    /// Module image in its loaded (virtual) layout.
    #[arg(long, requires = "module_base")]
    module: Option<PathBuf>,

    #[arg(long, value_parser = parse_addr)]
    module_base: Option<u64>,

    /// Declared struct library (JSON).
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_parser = parse_addr)]
    address: u64,

    /// Bytes to analyze. Defaults to the declared size of --struct.
    #[arg(short, long, value_parser = parse_addr)]
    size: Option<u64>,

    /// Declared struct to compare against.
    #[arg(long = "struct")]
    struct_name: Option<String>,

    /// Expand embedded and pointed-to declared structs.
    #[arg(long)]
    nested: bool,
}

#[derive(Args, Debug)]
struct RangeArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_parser = parse_addr)]
    address: u64,

    #[arg(short, long, value_parser = parse_addr)]
    size: u64,
}

#[derive(Args, Debug)]
struct ObjectArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_parser = parse_addr)]
    address: u64,
}

#[derive(Args, Debug)]
struct InterpretArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_parser = parse_addr)]
    address: u64,

    #[arg(short, long, default_value = "8")]
    size: usize,
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    layout: &'a DiscoveredLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<&'a ComparisonResult>,
}

fn parse_addr(text: &str) -> Result<u64, String> {
    utils::parse_address(text).ok_or_else(|| format!("not an address: {}", text))
}

fn main() {
    let cli = Cli::parse();
    logging::init_from_env(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[!]".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path).map_err(|e| anyhow!(e))?,
        None => AnalysisConfig::default(),
    };
    let start = Instant::now();

    match cli.command {
        Command::Analyze(args) => {
            config.nested |= args.nested;
            let ctx = open_target(&args.target, config)?;
            handle_analyze(&ctx, &args, cli.output.as_deref())?;
        }
        Command::Patterns(args) => {
            let ctx = open_target(&args.target, config)?;
            handle_patterns(&ctx, &args, cli.output.as_deref())?;
        }
        Command::Vtable(args) => {
            let ctx = open_target(&args.target, config)?;
            handle_vtable(&ctx, &args, cli.output.as_deref())?;
        }
        Command::Interpret(args) => {
            let ctx = open_target(&args.target, config)?;
            handle_interpret(&ctx, &args, cli.output.as_deref())?;
        }
    }

    log::info!("done in {:.2?}", start.elapsed());
    Ok(())
}

fn open_target(target: &TargetArgs, config: AnalysisConfig) -> anyhow::Result<AnalysisContext> {
    let (space, mut modules): (Arc<dyn AddressSpace>, ModuleMap) = match (target.pid, &target.dump) {
        (Some(pid), _) => {
            let process = ProcessMemory::attach(pid).with_context(|| format!("Failed to attach to pid {}", pid))?;
            let modules = ModuleMap::from_regions(&process.regions());
            println!("{} Attached to pid {} ({} modules)", "[+]".green(), pid, modules.len());
            (Arc::new(process) as Arc<dyn AddressSpace>, modules)
        }
        (None, Some(dump)) => {
            let base = target.base.ok_or_else(|| anyhow!("--dump requires --base"))?;
            let mut image = ImageMemory::new();
            image
                .map_file(dump, Address::new(base), Protection::ReadWrite)
                .with_context(|| format!("Failed to map dump {}", dump.display()))?;
            if let (Some(path), Some(module_base)) = (&target.module, target.module_base) {
                image
                    .map_file(path, Address::new(module_base), Protection::ReadExecute)
                    .with_context(|| format!("Failed to map module {}", path.display()))?;
            }
            println!("{} Mapped {} at 0x{:x}", "[+]".green(), dump.display(), base);
            (Arc::new(image) as Arc<dyn AddressSpace>, ModuleMap::new())
        }
        (None, None) => bail!("either --pid or --dump is required"),
    };

    if let (Some(path), Some(module_base)) = (&target.module, target.module_base) {
        let module = load_module(path, Address::new(module_base))?;
        println!("{} Module {}", "[+]".green(), module);
        let mut map = ModuleMap::new().with_module(module);
        for other in modules.modules() {
            if map.find(other.base).is_none() {
                map.add(other.clone());
            }
        }
        modules = map;
    }

    let mut ctx = AnalysisContext::new(space, config).with_modules(modules);
    if let Some(path) = &target.schema {
        let schema = SchemaLibrary::load(path).with_context(|| format!("Failed to load schema {}", path.display()))?;
        println!("{} Loaded {} declared structs", "[+]".green(), schema.len());
        ctx = ctx.with_schema(schema);
    }
    Ok(ctx)
}

fn load_module(path: &Path, base: Address) -> anyhow::Result<ModuleInfo> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ModuleInfo::from_pe(&name, base, &bytes)?)
}

fn handle_analyze(ctx: &AnalysisContext, args: &AnalyzeArgs, output: Option<&Path>) -> anyhow::Result<()> {
    let declared_size = args
        .struct_name
        .as_deref()
        .and_then(|name| ctx.schema().declared_size(name));
    let size = args
        .size
        .or(declared_size)
        .ok_or_else(|| anyhow!("--size is required unless --struct names a sized declared struct"))?;

    println!("{} Analyzing 0x{:x} bytes at 0x{:x}", "[*]".blue(), size, args.address);
    let analyzer = MemoryAnalyzer::new(ctx);
    let mut layout = analyzer.analyze(Address::new(args.address), size as usize, args.struct_name.as_deref());

    if !layout.readable {
        println!("{} Range is not readable", "[!]".yellow());
    }

    let comparison = match args.struct_name.as_deref() {
        Some(name) if ctx.schema().contains(name) => {
            Some(LayoutComparator::compare_named(&mut layout, ctx.schema(), name)?)
        }
        Some(name) => {
            println!("{} {} is not declared, skipping comparison", "[!]".yellow(), name);
            None
        }
        None => None,
    };

    print!("{}", layout);
    if let Some(result) = &comparison {
        println!();
        if result.passed() {
            print!("{}", result.to_string().green());
        } else {
            print!("{}", result.to_string().red());
        }
    }

    write_json(
        output,
        &AnalyzeOutput {
            layout: &layout,
            comparison: comparison.as_ref(),
        },
    )
}

fn handle_patterns(ctx: &AnalysisContext, args: &RangeArgs, output: Option<&Path>) -> anyhow::Result<()> {
    let recognizer = PatternRecognizer::from_context(ctx);
    let report = recognizer.detect_patterns(Address::new(args.address), args.size as usize);

    println!("{} {} padding runs ({})", "[+]".green(), report.padding.len(), utils::format_bytes(report.padding_bytes() as u64));
    for pad in &report.padding {
        let kind = if pad.is_zero_padding { "zero" } else { "debug" };
        println!("  +0x{:04x} {:>6} bytes of 0x{:02x} ({})", pad.offset, pad.size, pad.byte, kind);
    }
    println!("{} {} array candidates", "[+]".green(), report.arrays.len());
    for array in &report.arrays {
        println!(
            "  +0x{:04x} {} x {} bytes [{:.0}%]",
            array.offset,
            array.count,
            array.stride,
            array.confidence * 100.0
        );
    }

    write_json(output, &report)
}

fn handle_vtable(ctx: &AnalysisContext, args: &ObjectArgs, output: Option<&Path>) -> anyhow::Result<()> {
    let validator = PointerValidator::from_context(ctx);
    let detector = VTableDetector::new(&validator, ctx.config());
    let info = detector.analyze_vtable(Address::new(args.address));

    let line = info.to_string();
    if info.is_vtable {
        println!("{} {}", "[+]".green(), line);
        if let Some(name) = info.address.and_then(|vt| ctx.vtable_type(vt)) {
            println!("    type: {}", name.cyan());
        }
    } else {
        println!("{} {}", "[-]".yellow(), line);
    }

    write_json(output, &info)
}

fn handle_interpret(ctx: &AnalysisContext, args: &InterpretArgs, output: Option<&Path>) -> anyhow::Result<()> {
    let validator = PointerValidator::from_context(ctx);
    let inference = TypeInference::new(&validator, ctx.config());
    let interp = inference.get_interpretations(Address::new(args.address), args.size.min(8));

    if interp.is_empty() {
        println!("{} 0x{:x} is not readable", "[!]".yellow(), args.address);
        return write_json(output, &interp);
    }

    println!("{} {}", "raw:".bold(), utils::hex_string_spaced(&interp.raw));
    if let (Some(i), Some(u)) = (interp.int8, interp.uint8) {
        println!("  int8/uint8    {} / {}", i, u);
    }
    if let (Some(i), Some(u)) = (interp.int16, interp.uint16) {
        println!("  int16/uint16  {} / {}", i, u);
    }
    if let (Some(i), Some(u)) = (interp.int32, interp.uint32) {
        println!("  int32/uint32  {} / {}", i, u);
    }
    if let (Some(i), Some(u)) = (interp.int64, interp.uint64) {
        println!("  int64/uint64  {} / {}", i, u);
    }
    if let Some(f) = interp.float {
        println!("  float         {}{}", f, if interp.float_is_invalid { " (invalid)" } else { "" });
    }
    if let Some(d) = interp.double {
        println!("  double        {}{}", d, if interp.double_is_invalid { " (invalid)" } else { "" });
    }
    if let Some(pointer) = &interp.pointer {
        let verdict = if pointer.is_valid { pointer.kind.to_string().green() } else { "invalid".red() };
        println!("  pointer       {} {} ({})", pointer.value, verdict, pointer.target);
    }
    if let Some(string) = &interp.string {
        println!("  string        {:?} ({} bytes)", string.value, string.length);
    }
    if interp.is_all_zeros {
        println!("  {}", "all zeros".dimmed());
    }
    if interp.is_debug_pattern {
        println!("  {}", "debug fill pattern".dimmed());
    }

    write_json(output, &interp)
}

fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let path = match output {
        Some(path) => path,
        None => return Ok(()),
    };
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    println!("{} Output written to: {}", "[+]".green(), path.display());
    Ok(())
}
