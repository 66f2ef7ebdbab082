//! clreduce: interestingness tests for OpenCL wrong-code reduction
//!
//! ## Usage
//!
//! ```bash
//! clreduce test CLProg_0.cl                  # exit 0 when interesting
//! clreduce check --test-case-dir cases       # verdict per test case
//! clreduce reduce-work-sizes CLProg_0.cl     # shrink -g/-l in the header
//! clreduce config --format yaml              # resolved configuration
//! ```

use clap::Parser;
use clreduce::{
    test_case, Dialect, ReductionMode, SystemRunner, TestCase, WrongCodeOracle,
};
use clreduce_cli::{
    collect_test_cases, exit_status, reduce_all, CheckArgs, CheckRunner, Cli, CliConfig, CliError,
    CliResult, ColorChoice, Commands, ConfigArgs, OutputFormat, ProgressReporter,
    ReduceWorkSizesArgs, StripLineMarkersArgs, TestArgs, Verbosity,
};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(config.verbosity);

    match run(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
}

fn init_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

fn run(cli: Cli, config: &CliConfig) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Test(args) => run_test(&args),
        Commands::Check(args) => run_check(config, &args),
        Commands::ReduceWorkSizes(args) => run_reduce_work_sizes(config, &args),
        Commands::StripLineMarkers(args) => run_strip_line_markers(config, &args),
        Commands::Config(args) => run_config(&args),
    }
}

fn run_test(args: &TestArgs) -> CliResult<ExitCode> {
    let path = args.file.as_ref().ok_or_else(|| {
        CliError::test_case_not_found("no test case given and CREDUCE_TEST_CASE is not set")
    })?;
    if !path.is_file() {
        return Err(CliError::test_case_not_found(path.display().to_string()));
    }

    let oracle = WrongCodeOracle::new(SystemRunner::new(), args.execution.resolve()?);
    let verdict = oracle.evaluate(&TestCase::load(path)?);
    Ok(ExitCode::from(exit_status(
        Dialect::Permissive.exit_code(&verdict),
    )))
}

fn run_check(config: &CliConfig, args: &CheckArgs) -> CliResult<ExitCode> {
    let cases = collect_test_cases(
        &args.files,
        args.test_case_dir.as_deref(),
        args.exclude_file.as_deref(),
    )?;
    if cases.is_empty() {
        return Err(CliError::invalid_argument(
            "no test cases given; pass files or --test-case-dir",
        ));
    }

    let oracle = WrongCodeOracle::new(SystemRunner::new(), args.execution.resolve()?);
    let mut runner = CheckRunner::new(oracle, reporter(config))
        .with_delete(args.delete)
        .with_log(args.log.clone());
    let report = runner.run(&cases)?;

    // A single test case reports its strict verdict as the exit status
    match report.outcomes.as_slice() {
        [only] => match &only.verdict {
            Some(verdict) => Ok(ExitCode::from(exit_status(
                Dialect::Strict.exit_code(verdict),
            ))),
            None => Ok(ExitCode::FAILURE),
        },
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn run_reduce_work_sizes(config: &CliConfig, args: &ReduceWorkSizesArgs) -> CliResult<ExitCode> {
    let start = Instant::now();
    let mode = if args.unchecked {
        ReductionMode::Unchecked
    } else {
        ReductionMode::Checked
    };
    let mut oracle = WrongCodeOracle::new(SystemRunner::new(), args.execution.resolve()?);
    let reporter = reporter(config);
    let summary = reduce_all(&mut oracle, &reporter, &args.files, mode);
    reporter.info(&format!(
        "{} reduced, {} unchanged, {} failed; runtime {} seconds",
        summary.reduced,
        summary.unchanged,
        summary.errors,
        start.elapsed().as_secs()
    ));

    Ok(if summary.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_strip_line_markers(config: &CliConfig, args: &StripLineMarkersArgs) -> CliResult<ExitCode> {
    let reporter = reporter(config);
    for path in &args.files {
        test_case::strip_line_markers_in_place(path)?;
        reporter.success(&format!("{}: line markers removed", path.display()));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_config(args: &ConfigArgs) -> CliResult<ExitCode> {
    let execution = args.execution.resolve()?;
    let rendered = match OutputFormat::from(args.format) {
        OutputFormat::Json => serde_json::to_string_pretty(&execution)?,
        OutputFormat::Yaml => serde_yaml_ng::to_string(&execution)?,
    };
    println!("{}", rendered.trim_end());
    Ok(ExitCode::SUCCESS)
}
