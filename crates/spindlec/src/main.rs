use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use spindle_contracts::{SPINDLEC_DISASM_SCHEMA_VERSION, SPINDLEC_REPORT_SCHEMA_VERSION};
use spindlec::diagnostics::{Diagnostic, Report};
use spindlec::disasm::{self, Row};
use spindlec::stdlib::Stdlib;
use spindlec::{CompileError, CompileMode, CompileOptions, CompileResult, Handle, Program, Registry, Template};

#[derive(Parser)]
#[command(name = "spindlec")]
#[command(about = "Spindle template compiler (template JSON -> opcodes).", long_about = None)]
struct Cli {
    /// Log compile progress (overrides RUST_LOG's default level).
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    Compile {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        registry: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ModeArg::Aot)]
        mode: ModeArg,
        #[arg(long, value_enum, default_value_t = ViewArg::Layout)]
        view: ViewArg,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Disasm {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        registry: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ModeArg::Aot)]
        mode: ModeArg,
        #[arg(long, value_enum, default_value_t = ViewArg::Layout)]
        view: ViewArg,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Aot,
    Jit,
}

impl From<ModeArg> for CompileMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Aot => CompileMode::Aot,
            ModeArg::Jit => CompileMode::Jit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewArg {
    Layout,
    Partial,
    Wrapped,
}

#[derive(Debug, Serialize)]
struct CompileReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    mode: CompileMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<Handle>,
    stdlib: Stdlib,
    heap_size: usize,
    constant_count: usize,
    heap_sha256: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    exit_code: u8,
}

#[derive(Debug, Serialize)]
struct DisasmReport {
    schema_version: &'static str,
    r#in: String,
    handles: Vec<DisasmHandle>,
}

#[derive(Debug, Serialize)]
struct DisasmHandle {
    handle: Handle,
    label: String,
    rows: Vec<Row>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.cmd {
        Cmd::Compile {
            input,
            registry,
            mode,
            view,
            out,
        } => {
            let mut program = new_program(registry.as_deref(), mode.into())?;
            let compiled = compile_input(&mut program, &input, view)?;

            let diagnostics = match &compiled {
                Ok(result) => result.errors.iter().map(Diagnostic::recorded).collect(),
                Err(err) => vec![Diagnostic::compile_error(err)],
            };
            let diag = Report::ok().with_diagnostics(diagnostics);
            let exit_code = if diag.ok { 0 } else { 1 };
            let report = CompileReport {
                schema_version: SPINDLEC_REPORT_SCHEMA_VERSION,
                command: "compile",
                ok: diag.ok,
                r#in: input.display().to_string(),
                mode: program.mode(),
                handle: compiled.as_ref().ok().map(|result| result.handle),
                stdlib: *program.stdlib(),
                heap_size: program.heap().size(),
                constant_count: program.constants().len(),
                heap_sha256: program.heap().digest_hex(),
                diagnostics_count: diag.diagnostics.len(),
                diagnostics: diag.diagnostics,
                exit_code,
            };

            match out {
                Some(path) => write_json_file(&path, &report)?,
                None => print_json(&report)?,
            }
            Ok(ExitCode::from(exit_code))
        }
        Cmd::Disasm {
            input,
            registry,
            mode,
            view,
            json,
        } => {
            let mut program = new_program(registry.as_deref(), mode.into())?;
            if let Err(err) = compile_input(&mut program, &input, view)? {
                anyhow::bail!("compile {}: {err}", input.display());
            }

            let mut handles = Vec::new();
            for (handle, label) in disasm::handles(&program) {
                let rows = disasm::disassemble(&program, handle)?;
                handles.push(DisasmHandle { handle, label, rows });
            }

            if json {
                print_json(&DisasmReport {
                    schema_version: SPINDLEC_DISASM_SCHEMA_VERSION,
                    r#in: input.display().to_string(),
                    handles,
                })?;
            } else {
                for entry in handles {
                    println!("{}:", entry.label);
                    for row in &entry.rows {
                        println!("{row}");
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn new_program(registry: Option<&Path>, mode: CompileMode) -> Result<Program> {
    let options = CompileOptions {
        mode,
        ..CompileOptions::default()
    };
    let registry = match registry {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read registry: {}", path.display()))?;
            Registry::from_json(&bytes, &options.decode_limits())
                .with_context(|| format!("load registry: {}", path.display()))?
        }
        None => Registry::new(),
    };
    Ok(Program::new(registry, options)?)
}

/// I/O failures are returned as errors; template problems come back in the inner result.
fn compile_input(
    program: &mut Program,
    input: &Path,
    view: ViewArg,
) -> Result<Result<CompileResult, CompileError>> {
    let bytes = std::fs::read(input).with_context(|| format!("read input: {}", input.display()))?;
    let template: Rc<Template> = match program.load(&bytes) {
        Ok(template) => template,
        Err(err) => return Ok(Err(err)),
    };
    log::debug!("loaded template {}", template.id());
    Ok(match view {
        ViewArg::Layout => program.compile(&template),
        ViewArg::Wrapped => program.compile_wrapped_layout(&template),
        ViewArg::Partial => program.compile_partial(&template).map(|partial| CompileResult {
            handle: partial.handle,
            errors: partial.errors,
        }),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn write_json_file(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }
    }
    let out = serde_json::to_string_pretty(value)? + "\n";
    std::fs::write(path, out.as_bytes()).with_context(|| format!("write: {}", path.display()))?;
    Ok(())
}
