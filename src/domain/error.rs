//! Domain error types.
//!
//! Fatal errors ([`BarsmithError`]) abort a run before any bar is processed.
//! Per-bar evaluation faults ([`EvalError`]) are recovered locally by the
//! simulation and never surface to the caller.

/// A parse error with position information for condition parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// A condition that could not be evaluated on one bar.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("non-finite arithmetic result")]
    NonFinite,
}

/// Top-level error type for barsmith.
#[derive(Debug, thiserror::Error)]
pub enum BarsmithError {
    #[error("no data for {symbol} ({timeframe})")]
    NoData { symbol: String, timeframe: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid indicator {spec}: {reason}")]
    InvalidIndicator { spec: String, reason: String },

    #[error("invalid {field} condition: {source}")]
    ConditionParse {
        field: String,
        #[source]
        source: ParseError,
    },

    #[error("unknown optimization parameter '{name}'")]
    UnknownParameter { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BarsmithError {
    /// True for the "no / insufficient / unreadable data" family.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            BarsmithError::NoData { .. }
                | BarsmithError::InsufficientData { .. }
                | BarsmithError::DataSource { .. }
        )
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BarsmithError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&BarsmithError> for std::process::ExitCode {
    fn from(err: &BarsmithError) -> Self {
        let code: u8 = match err {
            BarsmithError::Io(_) => 1,
            BarsmithError::ConfigParse { .. }
            | BarsmithError::ConfigMissing { .. }
            | BarsmithError::ConfigInvalid { .. }
            | BarsmithError::InvalidIndicator { .. }
            | BarsmithError::UnknownParameter { .. } => 2,
            BarsmithError::ConditionParse { .. } => 4,
            BarsmithError::NoData { .. }
            | BarsmithError::InsufficientData { .. }
            | BarsmithError::DataSource { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
