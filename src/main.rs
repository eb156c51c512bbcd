use clap::Parser;
use phototidy::cli::{Cli, run_cli_with_config};
use phototidy::output::OutputFormatter;
use phototidy::prompt::{InteractivePrompter, PresetAnswers, Prompter, prompt_base_directory};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    println!("Welcome to phototidy - your photos, sorted by the day they were taken.");

    let result = prompt_if_missing(&cli).and_then(|dir| {
        let mut prompter: Box<dyn Prompter> = if cli.dry_run {
            Box::new(PresetAnswers::preview())
        } else if cli.yes {
            Box::new(PresetAnswers::execute())
        } else {
            Box::new(InteractivePrompter)
        };
        run_cli_with_config(
            &dir,
            cli.config.as_deref(),
            cli.prune_empty,
            prompter.as_mut(),
        )
    });

    let code = match result {
        Ok(_) => {
            OutputFormatter::success("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    };
    println!("The process has completed.");
    code
}

fn prompt_if_missing(cli: &Cli) -> Result<std::path::PathBuf, String> {
    match &cli.directory {
        Some(dir) if dir.is_dir() => Ok(dir.clone()),
        Some(dir) => Err(format!("Not a directory: {}", dir.display())),
        None => prompt_base_directory(),
    }
}
