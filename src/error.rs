use std::fmt;

use thiserror::Error;

/// Source position of a node, attached by the parser when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Location(Option<(u32, u32)>);

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self(Some((line, column)))
    }

    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn line_column(&self) -> Option<(u32, u32)> {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some((line, column)) => write!(f, " - at line {}, column {}", line, column),
            None => Ok(()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    // Semantic errors raised while formalizing
    #[error("Ambiguous reference to field '{name}'{location}")]
    AmbiguousReference { name: String, location: Location },

    #[error("Duplicate variable '{name}' already in scope{location}")]
    DuplicateVariable { name: String, location: Location },

    #[error("META() in query with multiple FROM terms requires an argument{location}")]
    AmbiguousMeta { location: Location },

    // Pattern compilation errors
    #[error("Invalid LIKE pattern '{pattern}': trailing escape character")]
    LikeTrailingEscape { pattern: String },

    #[error("Invalid LIKE escape: {0}")]
    InvalidLikeEscape(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Regex pattern too long: {len} bytes (max {max})")]
    PatternTooLong { len: usize, max: usize },

    // Function resolution
    #[error("Invalid function {name}{location}")]
    UnknownFunction { name: String, location: Location },

    #[error("Number of arguments to function {name} must be between {min} and {max} (got {actual})")]
    InvalidArgumentCount {
        name: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ExprResult<T> = Result<T, ExprError>;

impl ExprError {
    pub fn ambiguous_reference(name: impl Into<String>, location: Location) -> Self {
        ExprError::AmbiguousReference {
            name: name.into(),
            location,
        }
    }

    pub fn duplicate_variable(name: impl Into<String>, location: Location) -> Self {
        ExprError::DuplicateVariable {
            name: name.into(),
            location,
        }
    }

    /// Errors that abort formalization of a statement.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            ExprError::AmbiguousReference { .. }
                | ExprError::DuplicateVariable { .. }
                | ExprError::AmbiguousMeta { .. }
        )
    }

    /// Errors produced while turning a LIKE pattern into a regex.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            ExprError::LikeTrailingEscape { .. }
                | ExprError::InvalidLikeEscape(_)
                | ExprError::InvalidRegex(_)
                | ExprError::PatternTooLong { .. }
        )
    }
}

impl serde::Serialize for ExprError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<regex::Error> for ExprError {
    fn from(err: regex::Error) -> Self {
        ExprError::InvalidRegex(err.to_string())
    }
}
