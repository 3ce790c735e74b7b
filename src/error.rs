//! Top-level error type.
//!
//! Each subsystem owns its error enum with miette `#[diagnostic]` derives
//! (code, help text, source chain). [`DeskError`] wraps them transparently
//! so the diagnostic reaches the user unchanged.

use miette::Diagnostic;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::case::CaseError;
use crate::config::ConfigError;
use crate::draft::ContractViolation;
use crate::knowledge::KnowledgeError;
use crate::llm::LlmError;
use crate::orchestrator::OrchestratorError;
use crate::paths::PathError;
use crate::review::ReviewError;
use crate::tools::ToolFailure;

#[derive(Debug, Error, Diagnostic)]
pub enum DeskError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolFailure),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Case(#[from] CaseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Contract(#[from] ContractViolation),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Archive(#[from] ArchiveError),
}

pub type DeskResult<T> = std::result::Result<T, DeskError>;
