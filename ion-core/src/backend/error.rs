//! Error Handling
//!
//! This module provides the error type shared by the front end, the CFG constructor and
//! the liveness engine, built with `thiserror`.
//!
//! # Error Categories
//! - **Parsing errors**: malformed source text (unknown opcode, bad operand, duplicate label)
//! - **Control flow errors**: unresolved or ambiguous branch targets, repeated CFG construction
//! - **Shape errors**: instructions whose use list does not match their opcode, local liveness
//!   sets that do not fit the function
//! - **Ordering errors**: running the global liveness phase before the CFG exists
//!
//! Every variant carries a suggestion, printed after the message.

use crate::backend::ir::BlockId;
use std::fmt;
use thiserror::Error;

/// Position in the source text (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while building or analysing a function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IonError {
    /// The source text could not be turned into a function.
    #[error("Parse error at {location}: {message}\nSuggestion: {suggestion}")]
    ParseError {
        message: String,
        location: SourceLocation,
        suggestion: String,
    },

    /// A jump or branch names a label that no block carries.
    ///
    /// Fatal for the construction call; never treated as a fallthrough.
    #[error("Unresolved label in block bb{block}{}: no block is labeled '{target}'\nSuggestion: {suggestion}", label_suffix(.label))]
    UnresolvedLabel {
        block: BlockId,
        label: Option<String>,
        target: String,
        suggestion: String,
    },

    /// Two blocks of one function carry the same label.
    #[error("Duplicate label '{label}' on blocks bb{first} and bb{second}\nSuggestion: {suggestion}")]
    DuplicateLabel {
        label: String,
        first: BlockId,
        second: BlockId,
        suggestion: String,
    },

    /// An instruction's use list does not fit its opcode.
    #[error("Malformed instruction {index} in block bb{block}: {message}\nSuggestion: {suggestion}")]
    MalformedInstruction {
        block: BlockId,
        index: usize,
        message: String,
        suggestion: String,
    },

    /// `construct` was called on a function whose edges are already wired.
    #[error("Control flow graph for function '{function}' is already built\nSuggestion: {suggestion}")]
    CfgAlreadyBuilt { function: String, suggestion: String },

    /// The global liveness phase needs a wired CFG.
    #[error("Control flow graph for function '{function}' has not been built\nSuggestion: {suggestion}")]
    CfgNotBuilt { function: String, suggestion: String },

    /// Local liveness sets handed to the solver do not describe this function.
    #[error("Invalid liveness info for block bb{block}: {message}\nSuggestion: {suggestion}")]
    InvalidLivenessInfo {
        block: BlockId,
        message: String,
        suggestion: String,
    },
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" ({label})"),
        None => String::new(),
    }
}

impl IonError {
    /// Create a parse error at a source location.
    #[cold]
    pub fn parse(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::ParseError {
            message: message.into(),
            location,
            suggestion: "Check the instruction syntax: `OP dest, use, ...` with `%N` registers and `label:` block headers.".to_string(),
        }
    }

    /// Create an unresolved-label error for a jump or branch in `block`.
    #[cold]
    pub fn unresolved_label(block: BlockId, label: Option<&str>, target: impl Into<String>) -> Self {
        Self::UnresolvedLabel {
            block,
            label: label.map(str::to_string),
            target: target.into(),
            suggestion: "Define a block with this label or fix the branch target spelling.".to_string(),
        }
    }

    #[cold]
    pub fn duplicate_label(label: impl Into<String>, first: BlockId, second: BlockId) -> Self {
        Self::DuplicateLabel {
            label: label.into(),
            first,
            second,
            suggestion: "Give every block a distinct label.".to_string(),
        }
    }

    /// Create a malformed-instruction error.
    #[cold]
    pub fn malformed(block: BlockId, index: usize, message: impl Into<String>) -> Self {
        Self::MalformedInstruction {
            block,
            index,
            message: message.into(),
            suggestion: "The instruction list was built outside the parser; check the opcode's operand shape.".to_string(),
        }
    }

    #[cold]
    pub fn cfg_already_built(function: impl Into<String>) -> Self {
        Self::CfgAlreadyBuilt {
            function: function.into(),
            suggestion: "Build the CFG once per function; re-parse the source to start over.".to_string(),
        }
    }

    #[cold]
    pub fn cfg_not_built(function: impl Into<String>) -> Self {
        Self::CfgNotBuilt {
            function: function.into(),
            suggestion: "Run CfgConstructor::construct before the global liveness phase.".to_string(),
        }
    }

    #[cold]
    pub fn invalid_liveness_info(block: BlockId, message: impl Into<String>) -> Self {
        Self::InvalidLivenessInfo {
            block,
            message: message.into(),
            suggestion: "Compute the local sets from the same function with compute_use_def.".to_string(),
        }
    }

    /// Location of a parse error, if this is one.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Self::ParseError { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Result alias for the core seams.
pub type IonResult<T> = std::result::Result<T, IonError>;
