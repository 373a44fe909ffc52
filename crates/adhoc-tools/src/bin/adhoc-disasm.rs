//! Disassembler for `ADCH` bytecode containers.
//!
//! Examples:
//!   adhoc-disasm boot.adc --disasm
//!   adhoc-disasm a.adc b.adc --out-dir target/disasm/
//!   cat boot.adc | adhoc-disasm - --stdin-name boot.adc --summary
//!   adhoc-disasm boot.adc --json | jq
//!
//! Useful options:
//!   --disasm        : print the annotated disassembly on stdout
//!   --emit <f>      : write the disassembly to a file
//!   --json          : print a structured JSON view
//!   --emit-json <f> : write the JSON view to a file
//!   --strings       : print the raw string table with varint-encoded ids
//!   --summary       : one-look overview (version/strings/instructions)
//!   --verify        : re-encode the decoded tree and decode it again
//!   --offset        : include container byte offsets per instruction
//!   --color <mode>  : auto|always|never
//!   --time          : processing time per input
//!   --strict        : fail on suspicious containers (0 root instructions)

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use serde::Serialize;
use yansi::{Color, Paint};

use adhoc_core::disasm::{disassemble_full, string_table_dump};
use adhoc_core::{CodeFrame, Container, Instruction};
use adhoc_tools::prelude::*;
use adhoc_tools::ColorMode as GlobalColorMode;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Parser, Debug)]
#[command(name = "adhoc-disasm", version, about = "Adhoc container disassembler (.adc -> text/JSON)")]
#[command(group(
    ArgGroup::new("stdout_mode")
        .args(["disasm", "json", "strings", "summary"])
        .multiple(true)
))]
struct Cli {
    /// Container file(s) to analyze (or '-' for stdin, single input)
    inputs: Vec<String>,

    /// Print the annotated disassembly on stdout
    #[arg(long)]
    disasm: bool,

    /// File to write the disassembly to (single input)
    #[arg(long, conflicts_with = "out_dir")]
    emit: Option<PathBuf>,

    /// Directory to write disassemblies to (multiple inputs)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print a structured JSON view on stdout
    #[arg(long)]
    json: bool,

    /// File to write the JSON view to (single input)
    #[arg(long)]
    emit_json: Option<PathBuf>,

    /// Print the raw string table with varint-encoded ids
    #[arg(long)]
    strings: bool,

    /// Quick overview (version/strings/instruction counts)
    #[arg(long)]
    summary: bool,

    /// Re-encode the decoded tree and decode it again as a self-check
    #[arg(long)]
    verify: bool,

    /// Fail on containers with an empty root instruction list
    #[arg(long)]
    strict: bool,

    /// Include container byte offsets in the disassembly
    #[arg(long)]
    offset: bool,

    /// Logical name when the input is '-' (stdin)
    #[arg(long, default_value = "<stdin>")]
    stdin_name: String,

    /// Print processing time per input
    #[arg(long)]
    time: bool,

    /// Summary colors: auto|always|never
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    color_eyre::install().ok();

    let cli = Cli::parse();
    setup_colors(match cli.color {
        ColorChoice::Auto => GlobalColorMode::Auto,
        ColorChoice::Always => GlobalColorMode::Always,
        ColorChoice::Never => GlobalColorMode::Never,
    });

    if cli.inputs.is_empty() {
        return Err(anyhow!("no input. Example: adhoc-disasm boot.adc --disasm"));
    }
    let use_stdin = cli.inputs.len() == 1 && cli.inputs[0] == "-";
    if use_stdin && cli.out_dir.is_some() {
        return Err(anyhow!("--out-dir does not apply to stdin; use --emit"));
    }
    if !use_stdin && cli.inputs.len() > 1 && (cli.emit.is_some() || cli.emit_json.is_some()) {
        return Err(anyhow!("multiple inputs: use --out-dir instead of --emit/--emit-json"));
    }

    if use_stdin {
        let bytes = read_stdin_to_bytes()?;
        process_one(&bytes, &Utf8PathBuf::from(&cli.stdin_name), &cli)?;
    } else {
        for input in &cli.inputs {
            let path = Utf8PathBuf::from(input);
            let bytes = read_bytes(&path)?;
            process_one(&bytes, &path, &cli)?;
        }
    }
    Ok(())
}

fn process_one(bytes: &[u8], name: &Utf8Path, cli: &Cli) -> Result<()> {
    let timer = Timer::start();
    let container =
        Container::from_bytes(bytes).with_context(|| format!("decoding failed: {name}"))?;

    if cli.strict && container.root.instructions.is_empty() {
        return Err(anyhow!("empty container (0 root instructions) — failed due to --strict ({name})"));
    }

    if cli.summary {
        print_summary(&container, name);
    }

    if cli.disasm || cli.emit.is_some() || cli.out_dir.is_some() {
        let title = name.file_name().unwrap_or("container");
        let text = disassemble_full(&container, title, cli.offset)
            .with_context(|| format!("structural walk failed: {name}"))?;

        if let Some(file) = &cli.emit {
            let out = to_utf8(file.clone()).context("`--emit` path")?;
            write_text(&out, &text)?;
            eprintln!("disasm -> {out}");
        } else if let Some(dir) = &cli.out_dir {
            let dir = to_utf8(dir.clone()).context("`--out-dir` path")?;
            let out = dir.join(default_disasm_filename(name));
            write_text(&out, &text)?;
            eprintln!("disasm -> {out}");
        } else {
            println!("{text}");
        }
    }

    if cli.strings {
        print!("{}", string_table_dump(&container));
    }

    if cli.json || cli.emit_json.is_some() {
        let view = ContainerJson::build(&container, name.as_str());
        let pretty = serde_json::to_string_pretty(&view)?;
        if let Some(file) = &cli.emit_json {
            let out = to_utf8(file.clone()).context("`--emit-json` path")?;
            write_text(&out, &pretty)?;
            eprintln!("json -> {out}");
        } else {
            println!("{pretty}");
        }
    }

    if cli.verify {
        let reencoded = container.to_bytes()?;
        let back = Container::from_bytes(&reencoded)
            .with_context(|| format!("verify round-trip failed: {name}"))?;
        if back.root != container.root {
            return Err(anyhow!("verify round-trip produced a different tree ({name})"));
        }
        eprintln!("{}", "verify round-trip OK".paint(Color::Green));
    }

    if cli.time {
        eprintln!("{}", timer.pretty());
    }
    Ok(())
}

fn default_disasm_filename(input: &Utf8Path) -> String {
    let stem = input.file_stem().unwrap_or("container");
    format!("{stem}.disasm.txt")
}

fn print_summary(container: &Container, name: &Utf8Path) {
    let title = name.file_name().unwrap_or("<stdin>");
    let header = format!("== {title} ==");
    eprintln!("{}", header.paint(Color::Cyan).bold());
    eprintln!(
        "{} version={}, debug_info={}, strings={}, root instructions={} ({} total)",
        "•".paint(Color::Blue),
        container.version,
        container.debug_info,
        container.symbols.len(),
        container.root.instructions.len(),
        container.root.instruction_count_deep(),
    );
    if let Some(src) = &container.root.source_file {
        eprintln!("{} source file: {src}", "•".paint(Color::Blue));
    }
    eprintln!(
        "{} stack={}, heap={}, static={}",
        "•".paint(Color::Blue),
        container.root.max_stack_size,
        container.root.variable_heap_size,
        container.root.static_storage_size,
    );
}

#[derive(Serialize)]
struct ContainerJson<'a> {
    file: &'a str,
    version: u8,
    debug_info: bool,
    strings: Vec<&'a str>,
    root: FrameJson<'a>,
}

#[derive(Serialize)]
struct FrameJson<'a> {
    source_file: Option<&'a str>,
    parameters: Vec<&'a str>,
    captured: Vec<&'a str>,
    max_stack_size: u32,
    variable_heap_size: u32,
    static_storage_size: u32,
    instructions: Vec<InstructionJson<'a>>,
}

#[derive(Serialize)]
struct InstructionJson<'a> {
    index: usize,
    line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<FrameJson<'a>>,
}

impl<'a> ContainerJson<'a> {
    fn build(container: &'a Container, file: &'a str) -> Self {
        Self {
            file,
            version: container.version.get(),
            debug_info: container.debug_info,
            strings: container.symbols.iter().map(|s| s.as_str()).collect(),
            root: FrameJson::build(&container.root),
        }
    }
}

impl<'a> FrameJson<'a> {
    fn build(frame: &'a CodeFrame) -> Self {
        Self {
            source_file: frame.source_file.as_ref().map(|s| s.as_str()),
            parameters: frame.parameters.iter().map(|s| s.as_str()).collect(),
            captured: frame.captured.iter().map(|s| s.as_str()).collect(),
            max_stack_size: frame.max_stack_size,
            variable_heap_size: frame.variable_heap_size,
            static_storage_size: frame.static_storage_size,
            instructions: frame
                .instructions
                .iter()
                .enumerate()
                .map(|(index, ins)| InstructionJson::build(index, ins))
                .collect(),
        }
    }
}

impl<'a> InstructionJson<'a> {
    fn build(index: usize, ins: &'a Instruction) -> Self {
        Self {
            index,
            line: ins.line,
            offset: ins.offset,
            op: ins.op.to_string(),
            frame: ins.op.nested_frame().map(FrameJson::build),
        }
    }
}
