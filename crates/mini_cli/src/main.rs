//! Mini CLI: new, tokens, ast, ir, check, build, run, fmt, compile.

use clap::{Parser, Subcommand};
use mini_compiler::{
    compile_frontend, compile_with, print_diagnostics, CompilationResult, SourceUnit,
};
use mini_config::{Config, Target, CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const ENTRY_FILE: &str = "main.mini";
const SOURCE_EXTENSION: &str = "mini";

#[derive(Parser)]
#[command(name = "minic")]
#[command(about = "Mini language compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new Mini project
    New { name: String },
    /// Print the token stream
    Tokens { path: PathBuf },
    /// Print the syntax tree
    Ast { path: PathBuf },
    /// Print the three-address IR
    Ir { path: PathBuf },
    /// Report diagnostics without producing output
    Check { path: PathBuf },
    /// Write x86-64 assembly to dist/main.s
    Build { path: PathBuf },
    /// Interpret a file, or assemble and run it natively
    Run {
        path: PathBuf,
        #[arg(long)]
        native: bool,
    },
    /// Rewrite a file in canonical form
    Fmt { path: PathBuf },
    /// Print the full compilation result as JSON
    Compile {
        path: PathBuf,
        #[arg(long)]
        execute: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// `MINI_LOG` takes a filter directive; `MINI_DEBUG` alone means `debug`.
fn init_tracing() {
    let filter = match std::env::var("MINI_LOG") {
        Ok(directive) => EnvFilter::new(directive),
        Err(_) if std::env::var_os("MINI_DEBUG").is_some() => EnvFilter::new("debug"),
        Err(_) => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::New { name } => cmd_new(&name),
        Commands::Tokens { path } => cmd_tokens(&path),
        Commands::Ast { path } => cmd_ast(&path),
        Commands::Ir { path } => cmd_ir(&path),
        Commands::Check { path } => cmd_check(&path),
        Commands::Build { path } => cmd_build(&path).map(|out| {
            println!("Wrote {}", out.display());
        }),
        Commands::Run { path, native } => cmd_run(&path, native),
        Commands::Fmt { path } => cmd_fmt(&path),
        Commands::Compile { path, execute } => cmd_compile(&path, execute),
    }
}

fn cmd_new(name: &str) -> Result<(), String> {
    let dir = PathBuf::from(name);
    if dir.exists() {
        return Err(format!("Directory already exists: {}", name));
    }
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let manifest = Config::default()
        .to_toml_string()
        .map_err(|e| e.to_string())?;
    std::fs::write(dir.join(CONFIG_FILE), manifest).map_err(|e| e.to_string())?;
    let main = r#"function greet(n) {
    return n * 2;
}

let answer = greet(21);
print(answer);
"#;
    std::fs::write(dir.join(ENTRY_FILE), main).map_err(|e| e.to_string())?;
    println!("Created project {}", name);
    Ok(())
}

/// Entry file for a path: the file itself, or `main.mini` / `src/main.mini`
/// inside a project directory.
fn resolve_entry(path: &Path) -> Result<PathBuf, String> {
    if path.is_dir() {
        let direct = path.join(ENTRY_FILE);
        let nested = path.join("src").join(ENTRY_FILE);
        if direct.exists() {
            Ok(direct)
        } else if nested.exists() {
            Ok(nested)
        } else {
            Err(format!(
                "No {} or src/{} found in directory",
                ENTRY_FILE, ENTRY_FILE
            ))
        }
    } else if path.extension().is_some_and(|e| e == SOURCE_EXTENSION) {
        Ok(path.to_path_buf())
    } else {
        Err(format!(
            "Expected .{} file or project directory",
            SOURCE_EXTENSION
        ))
    }
}

fn load(path: &Path) -> Result<SourceUnit, String> {
    let entry = resolve_entry(path)?;
    let unit = SourceUnit::load(&entry)?;
    debug!(
        entry = %unit.path.display(),
        project_root = ?unit.project_root,
        "resolved entry"
    );
    Ok(unit)
}

/// Directory that receives `dist/`: the project root, or the file's directory.
fn output_root(unit: &SourceUnit) -> PathBuf {
    unit.project_root.clone().unwrap_or_else(|| {
        unit.path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    })
}

/// Compile for a specific backend, printing every diagnostic. Errors fail the command.
fn compile_for(unit: &SourceUnit, target: Target) -> Result<CompilationResult, String> {
    let mut config = unit.config.clone();
    config.compiler.target = target;
    let result = compile_with(&unit.source, &config);
    report(unit, &result)?;
    Ok(result)
}

fn report(unit: &SourceUnit, result: &CompilationResult) -> Result<(), String> {
    let diags: Vec<_> = result.diagnostics().cloned().collect();
    print_diagnostics(&unit.source, &unit.file_name(), &diags);
    if result.success {
        Ok(())
    } else {
        Err("Compilation failed".to_string())
    }
}

fn cmd_tokens(path: &Path) -> Result<(), String> {
    let unit = load(path)?;
    let lexed = mini_compiler::lexer::tokenize(&unit.source);
    for token in &lexed.tokens {
        println!("{}", token);
    }
    let diags: Vec<_> = lexed.errors.iter().map(|e| e.to_diagnostic()).collect();
    print_diagnostics(&unit.source, &unit.file_name(), &diags);
    if diags.is_empty() {
        Ok(())
    } else {
        Err("Lexing failed".to_string())
    }
}

fn cmd_ast(path: &Path) -> Result<(), String> {
    let unit = load(path)?;
    let result = unit.compile();
    print!("{}", result.ast);
    report(&unit, &result)
}

fn cmd_ir(path: &Path) -> Result<(), String> {
    let unit = load(path)?;
    let result = compile_frontend(&unit.source, &unit.config);
    report(&unit, &result)?;
    print!("{}", result.ir_listing);
    Ok(())
}

fn cmd_check(path: &Path) -> Result<(), String> {
    let unit = load(path)?;
    let result = unit.compile();
    report(&unit, &result)?;
    println!(
        "{}: ok ({} warning(s))",
        unit.file_name(),
        result.warnings.len()
    );
    Ok(())
}

/// Compile to assembly and write it to `<root>/dist/main.s`.
fn cmd_build(path: &Path) -> Result<PathBuf, String> {
    let unit = load(path)?;
    let result = compile_for(&unit, Target::X86_64)?;
    let asm = result
        .assembly
        .ok_or_else(|| "No assembly produced".to_string())?;
    let out_path = output_root(&unit).join("dist").join("main.s");
    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    std::fs::write(&out_path, asm).map_err(|e| e.to_string())?;
    Ok(out_path)
}

fn cmd_run(path: &Path, native: bool) -> Result<(), String> {
    if native {
        let asm_path = cmd_build(path)?;
        let stdout = assemble_and_run(&asm_path)?;
        print!("{}", stdout);
        return Ok(());
    }
    let unit = load(path)?;
    let result = compile_for(&unit, Target::Interpreter)?;
    let exec = result
        .execution
        .ok_or_else(|| "Nothing was executed".to_string())?;
    print!("{}", exec.stdout());
    if exec.success() {
        Ok(())
    } else {
        print_diagnostics(&unit.source, &unit.file_name(), &exec.diagnostics());
        Err("Program failed".to_string())
    }
}

/// Link `main.s` with the system C compiler and run the executable next to it.
fn assemble_and_run(asm_path: &Path) -> Result<String, String> {
    let cc = which::which("cc").map_err(|_| {
        "A C compiler (cc) is required to run natively; use `minic run` without --native"
            .to_string()
    })?;
    let exe = asm_path.with_extension("");
    debug!(cc = %cc.display(), exe = %exe.display(), "assembling");
    let status = Command::new(&cc)
        .arg(asm_path)
        .arg("-o")
        .arg(&exe)
        .status()
        .map_err(|e| e.to_string())?;
    if !status.success() {
        return Err(format!("cc exited with {}", status));
    }
    let output = Command::new(&exe)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("{} exited with {}", exe.display(), output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn cmd_fmt(path: &Path) -> Result<(), String> {
    let unit = load(path)?;
    let lexed = mini_compiler::lexer::tokenize(&unit.source);
    let mut diags: Vec<_> = lexed.errors.iter().map(|e| e.to_diagnostic()).collect();
    let (program, syntax_errors) = mini_compiler::parser::parse(lexed.tokens);
    diags.extend(syntax_errors.iter().map(|e| e.to_diagnostic()));
    if !diags.is_empty() {
        print_diagnostics(&unit.source, &unit.file_name(), &diags);
        return Err("Cannot format a file with errors".to_string());
    }
    let formatted = mini_syntax::pretty(&program);
    if formatted != unit.source {
        std::fs::write(&unit.path, formatted).map_err(|e| e.to_string())?;
        println!("Formatted {}", unit.path.display());
    }
    Ok(())
}

fn cmd_compile(path: &Path, execute: bool) -> Result<(), String> {
    let unit = load(path)?;
    let mut result = unit.compile();
    if execute {
        result.execute(&unit.config);
    }
    let json = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn new_project_builds() {
        let dir = scratch("minic_test_new");
        cmd_new(&dir.to_string_lossy()).expect("new");
        assert!(dir.join(CONFIG_FILE).exists());
        assert!(cmd_new(&dir.to_string_lossy()).is_err());

        let unit = load(&dir).expect("load");
        assert!(unit.project_root.is_some());
        let result = compile_for(&unit, Target::Interpreter).expect("compile");
        assert_eq!(result.execution.expect("execution").stdout(), "42\n");

        let asm_path = cmd_build(&dir).expect("build");
        let asm = std::fs::read_to_string(&asm_path).expect("read asm");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(asm_path.ends_with("dist/main.s"));
        assert!(asm.contains("fn_greet:"));
    }

    #[test]
    fn resolve_entry_rejects_other_extensions() {
        assert!(resolve_entry(Path::new("notes.txt")).is_err());
        assert_eq!(
            resolve_entry(Path::new("prog.mini")).expect("entry"),
            PathBuf::from("prog.mini")
        );
    }

    #[test]
    fn fmt_rewrites_to_canonical_form() {
        let dir = scratch("minic_test_fmt");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let file = dir.join("main.mini");
        std::fs::write(&file, "let   x=(1+2)*3;print( x );").expect("write");
        cmd_fmt(&file).expect("fmt");
        let text = std::fs::read_to_string(&file).expect("read");
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(text, "let x = (1 + 2) * 3;\nprint(x);\n");
    }

    #[test]
    fn failing_check_reports_error() {
        let dir = scratch("minic_test_check");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let file = dir.join("main.mini");
        std::fs::write(&file, "print(missing);").expect("write");
        let err = cmd_check(&file).unwrap_err();
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(err, "Compilation failed");
    }

    /// Interpreter and native executable must print the same text.
    #[test]
    fn native_output_matches_interpreter() {
        if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
            eprintln!("skip: native code targets x86-64 Linux");
            return;
        }
        if which::which("cc").is_err() {
            eprintln!("skip: cc not on PATH");
            return;
        }
        let programs = [
            "let x = 10; let y = 20; let result = x + y * 2; print(result);",
            "function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); } print(fact(10));",
            "let a = 7; if (a > 3) { print(a - 3); } else { print(0); } print(-a / 2);",
            "function add3(a, b, c) { return a + b + c; } let s = 0; s = add3(1, 2, 3); print(s * s);",
            "let n = 100; let m = n * n * n; print(m / 7); print(m - n);",
            "let n; print(1 < 2); print(true); print(n); print(!0); print(3 == 4);",
            "function none() { } let b = 2 >= 2; print(b); print(none()); print(false);",
        ];
        for (i, src) in programs.iter().enumerate() {
            let dir = scratch(&format!("minic_test_native_{}", i));
            std::fs::create_dir_all(&dir).expect("mkdir");
            let file = dir.join(ENTRY_FILE);
            std::fs::write(&file, src).expect("write");

            let unit = load(&file).expect("load");
            let interpreted = compile_for(&unit, Target::Interpreter)
                .expect("compile")
                .execution
                .expect("execution")
                .stdout();
            let asm_path = cmd_build(&file).expect("build");
            let native = assemble_and_run(&asm_path).expect("run native");
            let _ = std::fs::remove_dir_all(&dir);
            assert_eq!(native, interpreted, "program: {}", src);
        }
    }
}
