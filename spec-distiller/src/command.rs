// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The spec-distiller binary's command-line interface.

use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::Args;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::{
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};
use distill::controller::CompileStatus;
use distill::miner::MinerConf;
use distill::monitor::{emit, runtime, synthesize_all};
use distill::oracle::{Oracle, Syntactic};
use distill::{DistillConfig, DistillError, Driver, Hint};
use expr::parser::parse_error_diagnostic;
use expr::program::Program;
use expr::ParseError;
use smtlib::conf::{CvcConf, Z3Conf};
use solver::conf::DEFAULT_RESET_INTERVAL;
use solver::{solver_path, BridgeConf};

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SolverType {
    Z3,
    Cvc5,
    /// Only compare predicates syntactically
    None,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct SolverArgs {
    #[arg(value_enum, long, default_value_t = SolverType::Z3, global = true)]
    /// Solver deciding implications between candidates
    solver: SolverType,

    #[arg(long, default_value_t = 30, global = true)]
    /// SMT solver timeout per query in seconds
    timeout: usize,

    #[arg(long, default_value_t = DEFAULT_RESET_INTERVAL, global = true)]
    /// Reset the solver after this many queries
    reset_interval: usize,

    #[arg(long, global = true)]
    /// Write every SMT query to this directory
    smt_tee: Option<PathBuf>,
}

impl SolverArgs {
    fn bridge_conf(&self) -> Option<BridgeConf> {
        let timeout_ms = Some(self.timeout * 1000);
        let cmd = match self.solver {
            SolverType::Z3 => {
                let mut conf = Z3Conf::new(&solver_path("z3"));
                conf.timeout_ms(timeout_ms);
                conf.done()
            }
            SolverType::Cvc5 => {
                let mut conf = CvcConf::new_cvc5(&solver_path("cvc5"));
                conf.timeout_ms(timeout_ms);
                conf.done()
            }
            SolverType::None => return None,
        };
        let mut conf = BridgeConf::new(cmd);
        conf.reset_interval = self.reset_interval;
        conf.tee = self.smt_tee.clone();
        Some(conf)
    }
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct SearchArgs {
    #[arg(long, default_value = "pinfer-miner", global = true)]
    /// Miner executable
    miner: PathBuf,

    #[arg(long = "miner-arg", allow_hyphen_values = true, global = true)]
    /// Extra argument passed to the miner before the generated ones
    miner_args: Vec<String>,

    #[arg(long, default_value = "30m", global = true)]
    /// Kill a miner run after this long, as in `90s` or `30m`
    miner_timeout: humantime::Duration,

    #[arg(long, default_value_t = 1, global = true)]
    /// Largest term depth explored for hints that do not fix one
    term_depth: usize,

    #[arg(long, default_value_t = 2, global = true)]
    /// Largest number of guard predicates per candidate
    max_guards: usize,

    #[arg(long, default_value_t = 2, global = true)]
    /// Largest number of filter predicates per existential candidate
    max_filters: usize,

    #[arg(long, default_value_t = 3, global = true)]
    /// Pruning level passed to the miner
    pruning_level: usize,

    #[arg(long, default_value = "distill-outputs", global = true)]
    /// Directory for definitions, miner results and invariant listings
    outputs: PathBuf,

    #[arg(long, default_value = "project", global = true)]
    /// Stem of the generated definition files
    project: String,

    #[arg(short, long, global = true)]
    /// Ask the miner for verbose output
    verbose: bool,
}

impl SearchArgs {
    fn to_cfg(&self, trace_dir: Option<&Path>) -> DistillConfig {
        DistillConfig {
            project: self.project.clone(),
            term_depth: self.term_depth,
            max_guards: self.max_guards,
            max_filters: self.max_filters,
            pruning_level: self.pruning_level,
            output_dir: self.outputs.clone(),
            trace_dir: trace_dir.map(Path::to_path_buf),
            verbose: self.verbose,
            miner: MinerConf {
                program: self.miner.clone(),
                args: self.miner_args.clone(),
                timeout: self.miner_timeout.into(),
            },
        }
    }
}

#[derive(clap::Subcommand, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Generate the predicate and term definitions of a declared hint.
    Compile {
        /// Program model (JSON)
        program: String,
        /// Name of a hint declared in the program
        #[arg(long)]
        hint: String,
        /// Term depth, overriding the hint's
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Mine and distill invariants for declared hints.
    Run {
        /// Program model (JSON)
        program: String,
        /// Names of hints declared in the program
        #[arg(long, required = true)]
        hint: Vec<String>,
        /// Indexed trace folder
        #[arg(long)]
        traces: PathBuf,
    },
    /// Mine and distill invariants for the declared hints and every hint the
    /// program's control flow suggests.
    Auto {
        /// Program model (JSON)
        program: String,
        /// Indexed trace folder
        #[arg(long)]
        traces: PathBuf,
    },
    /// Rebuild the invariant listing from the stored results of a previous
    /// session, without running the miner.
    Replay {
        /// Program model (JSON)
        program: String,
    },
    /// Synthesize monitors for the invariants of a previous session and
    /// optionally run them over a recorded trace.
    Monitor {
        /// Program model (JSON)
        program: String,
        /// Event trace (JSON) to check
        #[arg(long)]
        trace: Option<PathBuf>,
    },
}

impl Command {
    fn program(&self) -> &str {
        match self {
            Command::Compile { program, .. }
            | Command::Run { program, .. }
            | Command::Auto { program, .. }
            | Command::Replay { program }
            | Command::Monitor { program, .. } => program,
        }
    }

    fn trace_dir(&self) -> Option<&Path> {
        match self {
            Command::Run { traces, .. } | Command::Auto { traces, .. } => Some(traces.as_path()),
            _ => None,
        }
    }

    fn needs_solver(&self) -> bool {
        !matches!(self, Command::Compile { .. })
    }

    /// Run the command. Returns whether the run was clean.
    fn run<O: Oracle>(
        &self,
        program: &Program,
        cfg: &DistillConfig,
        oracle: O,
    ) -> Result<bool, DistillError> {
        let mut driver = Driver::new(program, cfg, oracle)?;
        match self {
            Command::Compile { hint, depth, .. } => {
                let mut hint = user_hint(program, hint)?;
                hint.term_depth = depth.or(hint.term_depth);
                match driver.compile_hint(&hint)? {
                    CompileStatus::Ready => println!(
                        "wrote {} and {}",
                        cfg.predicates_file().display(),
                        cfg.terms_file().display()
                    ),
                    status => println!("{status:?}"),
                }
            }
            Command::Run { hint, .. } => {
                let hints = hint
                    .iter()
                    .map(|name| user_hint(program, name))
                    .collect::<Result<Vec<_>, _>>()?;
                driver.start_session()?;
                for hint in &hints {
                    driver.parameter_search(hint)?;
                }
                println!("{}", driver.finish()?);
            }
            Command::Auto { .. } => {
                let hints = program
                    .hints
                    .iter()
                    .map(|decl| Hint::from_decl(program, decl))
                    .collect::<Result<Vec<_>, _>>()?;
                driver.start_session()?;
                for hint in &hints {
                    driver.parameter_search(hint)?;
                }
                driver.auto_explore()?;
                println!("{}", driver.finish()?);
            }
            Command::Replay { .. } => {
                driver.replay()?;
                println!("{}", driver.finish()?);
            }
            Command::Monitor { trace, .. } => {
                driver.replay()?;
                let defs = synthesize_all(program, driver.store());
                let path = cfg.monitors_file();
                emit::write_monitors(&defs, &path)?;
                println!("wrote {} monitor(s) to {}", defs.len(), path.display());
                if let Some(trace) = trace {
                    let events = runtime::load_trace(trace)?;
                    let errors = runtime::check_trace(&defs, &events);
                    for err in &errors {
                        println!("{err}");
                    }
                    println!(
                        "{} event(s) checked, {} violation(s)",
                        events.len(),
                        errors.len()
                    );
                    return Ok(errors.is_empty());
                }
            }
        }
        Ok(true)
    }
}

fn user_hint(program: &Program, name: &str) -> Result<Hint, DistillError> {
    let decl = program
        .hint(name)
        .ok_or_else(|| DistillError::InvalidHint {
            hint: name.to_string(),
            msg: "not declared in the program".to_string(),
        })?;
    Hint::from_decl(program, decl)
}

/// Byte offset of a 1-based line and column, as reported by serde_json.
fn offset(text: &str, line: usize, column: usize) -> usize {
    let start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (start + column.saturating_sub(1)).min(text.len())
}

fn json_error_diagnostic<FileId>(
    file_id: FileId,
    text: &str,
    err: &serde_json::Error,
) -> Diagnostic<FileId> {
    let start = offset(text, err.line(), err.column());
    let end = (start + 1).min(text.len());
    Diagnostic::error()
        .with_message("could not load program")
        .with_labels(vec![
            Label::primary(file_id, start..end).with_message(err.to_string())
        ])
}

#[derive(clap::Parser, Debug)]
#[command(about, long_about=None)]
/// Entrypoint for the spec-distiller binary, including all commands.
pub struct App {
    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    /// Control color output. Auto disables colors with TERM=dumb or
    /// NO_COLOR=true.
    color: ColorOutput,

    #[command(flatten)]
    solver: SolverArgs,

    #[command(flatten)]
    search: SearchArgs,

    #[command(subcommand)]
    /// Command to run
    command: Command,
}

impl App {
    fn writer(&self) -> StandardStream {
        StandardStream::stderr(match &self.color {
            ColorOutput::Never => ColorChoice::Never,
            ColorOutput::Always => ColorChoice::Always,
            ColorOutput::Auto => ColorChoice::Auto,
        })
    }

    fn emit(&self, files: &SimpleFile<String, &str>, diagnostic: &Diagnostic<()>) {
        let config = terminal::Config {
            start_context_lines: 3,
            end_context_lines: 3,
            ..Default::default()
        };
        let writer = self.writer();
        let result = terminal::emit(&mut writer.lock(), &config, files, diagnostic);
        if let Err(err) = result {
            eprintln!("{}: {err}", diagnostic.message);
        }
    }

    fn report(&self, err: &DistillError) {
        match err {
            DistillError::GuardParse {
                text,
                err: ParseError::Syntax(syntax),
            } => {
                let files = SimpleFile::new("<predicate>".to_string(), text.as_str());
                self.emit(&files, &parse_error_diagnostic((), syntax));
            }
            _ => eprintln!("error: {err}"),
        }
    }

    /// Run the command, with the SMT bridge as oracle when the solver can be
    /// launched.
    fn run(&self, program: &Program) -> Result<bool, DistillError> {
        let cfg = self.search.to_cfg(self.command.trace_dir());
        let conf = if self.command.needs_solver() {
            self.solver.bridge_conf()
        } else {
            None
        };
        let Some(conf) = conf else {
            return self.command.run(program, &cfg, Syntactic);
        };
        match conf.launch(program) {
            Ok(bridge) => self.command.run(program, &cfg, bridge),
            Err(err) => {
                log::warn!("could not launch {}: {err}", conf.solver.cmdline());
                log::warn!("comparing candidates syntactically only");
                self.command.run(program, &cfg, Syntactic)
            }
        }
    }

    /// Run the application.
    pub fn exec(self) {
        let path = self.command.program();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("could not read {path}: {err}");
                process::exit(1);
            }
        };
        let program = match Program::from_json(&text) {
            Ok(program) => program,
            Err(err) => {
                let files = SimpleFile::new(path.to_string(), text.as_str());
                self.emit(&files, &json_error_diagnostic((), &text, &err));
                process::exit(1);
            }
        };
        match self.run(&program) {
            Ok(true) => {}
            Ok(false) => process::exit(1),
            Err(err) => {
                self.report(&err);
                process::exit(1);
            }
        }
    }
}
