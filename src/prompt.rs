//! Questions asked of the user.
//!
//! The organizer only needs yes/no answers, so everything goes through the
//! [`Prompter`] trait. [`InteractivePrompter`] asks on the terminal;
//! [`PresetAnswers`] answers from command-line flags.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use std::path::{Path, PathBuf};

pub const SHOW_PLAN_QUESTION: &str = "Show the organization plan?";
pub const EXECUTE_PLAN_QUESTION: &str = "Execute the organization plan?";

/// Answers the confirmations asked before a plan is shown or executed.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool, String>;
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct InteractivePrompter;

impl Prompter for InteractivePrompter {
    fn confirm(&mut self, question: &str) -> Result<bool, String> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(false)
            .interact()
            .map_err(|e| format!("Prompt failed: {}", e))
    }
}

/// Fixed answers, for runs without a terminal.
#[derive(Debug, Clone, Copy)]
pub struct PresetAnswers {
    pub show_plan: bool,
    pub execute_plan: bool,
}

impl PresetAnswers {
    /// Show the plan, never execute it.
    pub fn preview() -> Self {
        Self {
            show_plan: true,
            execute_plan: false,
        }
    }

    /// Show the plan, then execute it.
    pub fn execute() -> Self {
        Self {
            show_plan: true,
            execute_plan: true,
        }
    }
}

impl Prompter for PresetAnswers {
    fn confirm(&mut self, question: &str) -> Result<bool, String> {
        match question {
            SHOW_PLAN_QUESTION => Ok(self.show_plan),
            EXECUTE_PLAN_QUESTION => Ok(self.execute_plan),
            other => Err(format!("No preset answer for '{}'", other)),
        }
    }
}

/// Asks for the directory to organize until an existing directory is entered.
pub fn prompt_base_directory() -> Result<PathBuf, String> {
    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Directory to organize")
        .validate_with(|input: &String| -> Result<(), &str> {
            if Path::new(input.trim()).is_dir() {
                Ok(())
            } else {
                Err("Not a directory, please choose another folder")
            }
        })
        .interact_text()
        .map_err(|e| format!("Prompt failed: {}", e))?;

    Ok(PathBuf::from(input.trim()))
}
