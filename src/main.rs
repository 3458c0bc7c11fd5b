use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use repairloop::classify::classify;
use repairloop::config::{Config, DEFAULT_CONFIG_FILE};
use repairloop::logging::init_tracing;
use repairloop::mining::MiningSession;
use repairloop::protocol::{validate, ValidationContext};
use repairloop::reward::{RewardMode, RewardSignals};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "repairloop",
    about = "Feedback triage, repair-instruction checks and preference-pair mining for C repair loops",
    version
)]
struct Cli {
    /// TOML config file; missing means defaults
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mine new preference pairs from run directories
    Mine(MineArgs),
    /// Classify one feedback file
    Classify(ClassifyArgs),
    /// Check a repair instruction against a program and its feedback
    Validate(ValidateArgs),
    /// Score one code id in one iteration directory
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct MineArgs {
    /// Run directory to mine (repeatable); overrides config and environment
    #[arg(long = "run")]
    runs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    feedback: PathBuf,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long)]
    program: PathBuf,
    #[arg(long)]
    feedback: PathBuf,
    instruction: PathBuf,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    #[arg(long)]
    iteration_dir: PathBuf,
    #[arg(long)]
    code_id: u32,
    /// ordinal or weighted; defaults to the configured mode
    #[arg(long)]
    mode: Option<RewardMode>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(&cli.config);

    let result = match cli.command {
        Commands::Mine(args) => run_mine(&config, args),
        Commands::Classify(args) => run_classify(args),
        Commands::Validate(args) => run_validate(&config, args),
        Commands::Score(args) => run_score(&config, args),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_mine(config: &Config, args: MineArgs) -> Result<ExitCode> {
    let run_dirs = if args.runs.is_empty() {
        config.resolve_run_dirs()?
    } else {
        args.runs
    };
    let report = MiningSession::new(config, run_dirs).run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn run_classify(args: ClassifyArgs) -> Result<ExitCode> {
    let feedback = read(&args.feedback)?;
    let classification = classify(&feedback);
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(ExitCode::SUCCESS)
}

/// Exit status 2 when the instruction is rejected.
fn run_validate(config: &Config, args: ValidateArgs) -> Result<ExitCode> {
    let program = read(&args.program)?;
    let feedback = read(&args.feedback)?;
    let instruction = read(&args.instruction)?;

    let classification = classify(&feedback);
    let ctx = ValidationContext {
        program: &program,
        category: classification.category,
        symptoms: &classification.symptoms,
        forbidden_phrases: &config.protocol.forbidden_phrases,
    };
    let (verdict, code) = match validate(&instruction, &ctx) {
        Ok(valid) => (
            json!({
                "verdict": "accepted",
                "category": classification.category,
                "corrections": valid.corrections,
                "instruction": valid.render(),
            }),
            ExitCode::SUCCESS,
        ),
        Err(reason) => (
            json!({
                "verdict": "rejected",
                "category": classification.category,
                "message": reason.to_string(),
                "reason": reason,
            }),
            ExitCode::from(2),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(code)
}

fn run_score(config: &Config, args: ScoreArgs) -> Result<ExitCode> {
    let mode = args.mode.unwrap_or(config.reward.mode);
    let signals = RewardSignals::collect(&args.iteration_dir, args.code_id)?;
    let out = json!({
        "code_id": args.code_id,
        "mode": mode,
        "signals": signals,
        "score": signals.score(mode),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ExitCode::SUCCESS)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))
}
