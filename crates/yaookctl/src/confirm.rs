//! Operator confirmation for destructive operations.

use dialoguer::{theme::ColorfulTheme, Confirm};
use tracing::debug;

use crate::error::RecoveryError;

/// Asks the operator whether to go ahead.
pub trait Confirmer: Send + Sync {
    /// `Ok(true)` only on an explicit yes.
    fn confirm(&self, message: &str) -> Result<bool, RecoveryError>;
}

/// Interactive terminal prompt, defaulting to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, message: &str) -> Result<bool, RecoveryError> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact()
            .map_err(|e| RecoveryError::Prompt(e.to_string()))
    }
}

/// Answers yes without asking (`--yes-i-mean-it`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&self, message: &str) -> Result<bool, RecoveryError> {
        debug!(prompt = %message, "confirmation bypassed");
        Ok(true)
    }
}

/// Pick the confirmer matching the bypass flag.
pub fn confirmer_for(assume_yes: bool) -> Box<dyn Confirmer> {
    if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalConfirmer)
    }
}

/// Ask and turn a "no" into [`RecoveryError::Declined`].
pub fn require(confirmer: &dyn Confirmer, message: &str, action: &str) -> Result<(), RecoveryError> {
    if confirmer.confirm(message)? {
        Ok(())
    } else {
        Err(RecoveryError::declined(action))
    }
}
