//! Choosing which file to patch

use inquire::{InquireError, Text};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PickerError {
    #[error("File prompt failed: {0}")]
    Prompt(#[from] InquireError),
}

/// Source of the path to patch. `Ok(None)` means the user backed out.
pub trait PathProvider {
    fn select_file(&self) -> Result<Option<PathBuf>, PickerError>;
}

/// A path given on the command line.
#[derive(Debug, Clone)]
pub struct ArgumentPath(pub PathBuf);

impl PathProvider for ArgumentPath {
    fn select_file(&self) -> Result<Option<PathBuf>, PickerError> {
        Ok(Some(self.0.clone()))
    }
}

/// Ask for a path on the terminal. Dropping a file onto the terminal window
/// pastes its path, often quoted.
#[derive(Debug, Clone)]
pub struct PromptPath {
    message: String,
}

impl PromptPath {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for PromptPath {
    fn default() -> Self {
        Self::new("Screenpack file to patch (system.def):")
    }
}

impl PathProvider for PromptPath {
    fn select_file(&self) -> Result<Option<PathBuf>, PickerError> {
        let answer = Text::new(&self.message)
            .with_help_message("drag the file here or type its path; Esc to cancel")
            .prompt();
        match answer {
            Ok(input) => Ok(clean_input(&input).map(PathBuf::from)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Trim the answer and drop one pair of surrounding quotes.
fn clean_input(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}
