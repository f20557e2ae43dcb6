//! Mini compiler: lexer, parser, semantic analyzer, IR lowering, pipeline.

pub mod backend;
pub mod lexer;
pub mod lower;
pub mod optimize;
pub mod parser;
mod result;
pub mod semantic;

pub use result::CompilationResult;

use backend::BackendOutput;
use mini_config::{find_config, load_config, Config};
use mini_syntax::diagnostics::{format_diagnostic, Diagnostic};
use mini_syntax::ir::listing;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Print diagnostics to stderr with source context.
pub fn print_diagnostics(source: &str, file_name: &str, diags: &[Diagnostic]) {
    for d in diags {
        eprintln!("{}", format_diagnostic(source, file_name, d));
    }
}

/// Run the whole pipeline with default configuration.
pub fn compile(source: &str) -> CompilationResult {
    compile_with(source, &Config::default())
}

/// Run the pipeline. Stops after the first phase that reports errors; the
/// selected backend runs only on a clean front end.
#[tracing::instrument(skip_all, fields(bytes = source.len()))]
pub fn compile_with(source: &str, config: &Config) -> CompilationResult {
    let mut result = compile_frontend(source, config);
    if !result.success {
        return result;
    }

    let backend = backend::select(config);
    match backend.run(&result.ir) {
        Ok(BackendOutput::Assembly(asm)) => result.assembly = Some(asm),
        Ok(BackendOutput::Execution(exec)) => result.execution = Some(exec),
        Err(diag) => {
            debug!(backend = backend.name(), "backend failed");
            result.errors.push(diag);
        }
    }
    result.success = result.errors.is_empty();
    result
}

/// Lex, parse, analyze and lower without running a backend. On success `ir`
/// and `ir_listing` hold the program.
pub fn compile_frontend(source: &str, config: &Config) -> CompilationResult {
    let mut result = CompilationResult::default();

    let lexed = lexer::tokenize(source);
    debug!(tokens = lexed.tokens.len(), errors = lexed.errors.len(), "lexed");
    result.tokens = lexed.tokens.clone();
    if !lexed.errors.is_empty() {
        result.errors = lexed.errors.iter().map(|e| e.to_diagnostic()).collect();
        return result;
    }

    let (program, syntax_errors) = parser::parse(lexed.tokens);
    debug!(
        statements = program.statements.len(),
        errors = syntax_errors.len(),
        "parsed"
    );
    result.ast = mini_syntax::printer::dump(&program);
    if !syntax_errors.is_empty() {
        result.errors = syntax_errors.iter().map(|e| e.to_diagnostic()).collect();
        result.program = Some(program);
        return result;
    }

    let analysis = semantic::analyze(&program);
    debug!(
        errors = analysis.errors.len(),
        warnings = analysis.warnings.len(),
        "analyzed"
    );
    result.symbols = analysis.symbols;
    result.warnings = analysis.warnings.iter().map(|w| w.to_diagnostic()).collect();
    if !analysis.errors.is_empty() {
        result.errors = analysis.errors.iter().map(|e| e.to_diagnostic()).collect();
        result.program = Some(program);
        return result;
    }

    let mut ir = lower::generate_ir(&program);
    if config.compiler.optimize {
        ir = optimize::optimize(ir);
    }
    debug!(instructions = ir.len(), "lowered");
    result.ir_listing = listing(&ir);
    result.program = Some(program);
    result.ir = ir;
    result.success = true;
    result
}

impl CompilationResult {
    /// Interpret the IR and store the outcome in `execution`. No-op unless the
    /// front end succeeded; a native code generation failure does not block it.
    pub fn execute(&mut self, config: &Config) {
        if !self.frontend_succeeded() {
            return;
        }
        self.execution = Some(backend::interpreter(config).execute(&self.ir));
    }
}

/// A source file and the configuration that applies to it.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Directory holding `mini.toml`, if one was found.
    pub project_root: Option<PathBuf>,
    pub source: String,
    pub config: Config,
}

impl SourceUnit {
    /// Read a file. Configuration comes from the nearest `mini.toml` above
    /// it, or defaults.
    pub fn load(path: &Path) -> Result<SourceUnit, String> {
        let path = path
            .canonicalize()
            .map_err(|e| format!("failed to canonicalize {}: {}", path.display(), e))?;
        let source = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let (config, project_root) = match find_config(dir) {
            Some(file) => {
                let config = load_config(&file)
                    .map_err(|e| format!("failed to load {}: {}", file.display(), e))?;
                debug!(config = %file.display(), "loaded configuration");
                (config, file.parent().map(Path::to_path_buf))
            }
            None => (Config::default(), None),
        };
        Ok(SourceUnit {
            path,
            project_root,
            source,
            config,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn compile(&self) -> CompilationResult {
        compile_with(&self.source, &self.config)
    }
}

/// Read and compile one file with its project configuration.
pub fn compile_file(path: &Path) -> Result<(SourceUnit, CompilationResult), String> {
    let unit = SourceUnit::load(path)?;
    let result = unit.compile();
    Ok((unit, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mini_config::Target;

    #[test]
    fn clean_program_reaches_backend() {
        let result = compile("function sq(n) { return n * n; } print(sq(4));");
        assert!(result.success, "{:?}", result.errors);
        let asm = result.assembly.as_deref().unwrap_or_default();
        assert!(asm.contains("fn_sq:"));
        assert!(result.ir_listing.starts_with("func <main>()"));
        assert!(result.execution.is_none());
    }

    #[test]
    fn lexical_errors_stop_the_pipeline() {
        let result = compile("let x = 1 # 2;");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].phase, mini_syntax::Phase::Lexical);
        assert!(result.ast.is_empty());
        assert!(result.ir.is_empty());
    }

    #[test]
    fn syntax_errors_keep_the_partial_ast() {
        let result = compile("let = 1;\nprint(2);");
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .all(|d| d.phase == mini_syntax::Phase::Syntax));
        assert!(result.ast.contains("PrintStatement"));
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn warnings_survive_success() {
        let result = compile("let unused = 1;");
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn interpreter_target_executes_during_compile() {
        let mut config = Config::default();
        config.compiler.target = Target::Interpreter;
        let result = compile_with("print(1 + 2);", &config);
        assert!(result.assembly.is_none());
        let exec = result.execution.expect("execution");
        assert_eq!(exec.stdout(), "3\n");
    }

    #[test]
    fn execute_is_skipped_on_failure() {
        let mut result = compile("print(y);");
        result.execute(&Config::default());
        assert!(result.execution.is_none());
    }

    #[test]
    fn execute_runs_despite_native_limits() {
        let mut result = compile("let s = 'a'; print(s); print(0.5 + 1);");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].phase, mini_syntax::Phase::CodeGeneration);
        assert!(result.frontend_succeeded());
        result.execute(&Config::default());
        assert_eq!(result.execution.expect("execution").stdout(), "a\n1.5\n");
    }

    #[test]
    fn frontend_stops_before_any_backend() {
        let mut config = Config::default();
        config.compiler.target = Target::Interpreter;
        let result = compile_frontend("print(1); print(2);", &config);
        assert!(result.success);
        assert_eq!(
            result.ir_listing,
            "func <main>()\n  print 1\n  print 2\n  return null\n"
        );
        assert!(result.execution.is_none());
        assert!(result.assembly.is_none());
    }

    #[test]
    fn deeply_nested_source_fails_cleanly() {
        let src = format!("print({}1{});", "(".repeat(100_000), ")".repeat(100_000));
        let result = compile(&src);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, "nesting-too-deep");
        assert!(result.ir.is_empty());
    }

    #[test]
    fn native_float_is_a_codegen_error() {
        let result = compile("print(1.5);");
        assert!(!result.success);
        assert_eq!(result.errors[0].phase, mini_syntax::Phase::CodeGeneration);
        assert_eq!(result.ir_listing, "func <main>()\n  print 1.5\n  return null\n");
    }

    #[test]
    fn compile_file_uses_nearest_config() {
        let root = std::env::temp_dir().join("mini_compile_file_config");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("src")).expect("mkdir");
        std::fs::write(
            root.join("mini.toml"),
            "[compiler]\ntarget = \"interpreter\"\n",
        )
        .expect("write config");
        let main = root.join("src").join("main.mini");
        std::fs::write(&main, "print(6 * 7);").expect("write source");
        let loaded = compile_file(&main);
        let _ = std::fs::remove_dir_all(&root);
        let (unit, result) = loaded.expect("compile");
        assert_eq!(unit.config.compiler.target, Target::Interpreter);
        assert_eq!(unit.file_name(), "main.mini");
        assert!(unit.project_root.is_some());
        assert_eq!(result.execution.expect("execution").stdout(), "42\n");
    }

    #[test]
    fn missing_file_is_an_error_message() {
        let err = compile_file(Path::new("/nonexistent/dir/main.mini")).unwrap_err();
        assert!(err.contains("failed to canonicalize"));
    }
}
