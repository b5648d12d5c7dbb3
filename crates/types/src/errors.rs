use solana_program::pubkey::Pubkey;
use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Every failure the vault core can report.
///
/// Errors are grouped the way callers have to react to them: precondition and
/// input errors are raised before any external call is made, `HintStale` is the
/// only variant that is safe to retry as-is, and external errors carry the
/// message returned by the lending protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalidaError {
    // ========================================================================
    // Precondition Errors
    // ========================================================================

    /// Position is already open on the lending protocol
    #[error("Trove is already active")]
    AlreadyActive,

    /// Operation needs an open position
    #[error("Trove is not active")]
    NotActive,

    /// Caller is not the identity allowed to perform this operation
    #[error("Unauthorized: caller {caller} != required {required}")]
    Unauthorized { caller: Pubkey, required: Pubkey },

    /// One-time configuration was already applied
    #[error("Already initialized: {component}")]
    AlreadyInitialized { component: String },

    /// One-time configuration has not been applied yet
    #[error("Not initialized: {component}")]
    NotInitialized { component: String },

    /// Activation requested without idle collateral to seed the position
    #[error("No collateral balance to open the position with")]
    NoCollateralBalance,

    // ========================================================================
    // Input Validation Errors
    // ========================================================================

    /// Zero amounts are rejected
    #[error("Amount must be greater than zero")]
    NonZeroAmountRequired,

    /// Not enough balance to cover the request
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    /// Invalid parameter
    #[error("Invalid parameter '{parameter}': got '{value}', expected '{expected}'")]
    InvalidParameter { parameter: String, value: String, expected: String },

    // ========================================================================
    // External State Races
    // ========================================================================

    /// Hint correction needed more steps than allowed
    #[error("Hint stale: bracket not corrected within {max_steps} steps")]
    HintStale { max_steps: u32 },

    // ========================================================================
    // Math Errors
    // ========================================================================

    /// Arithmetic overflow occurred
    #[error("Math overflow in '{operation}' with values: {values:?}")]
    MathOverflow { operation: String, values: Vec<String> },

    /// Arithmetic underflow occurred
    #[error("Math underflow in '{operation}' with values: {values:?}")]
    MathUnderflow { operation: String, values: Vec<String> },

    /// Division by zero
    #[error("Division by zero in context: {context}")]
    DivisionByZero { context: String },

    // ========================================================================
    // External Collaborator Errors
    // ========================================================================

    /// The lending protocol, list or price feed rejected a call
    #[error("External call '{operation}' failed: {reason}")]
    ExternalCall { operation: String, reason: String },

    /// The lending protocol does not know the position
    #[error("Position not found: {position}")]
    PositionNotFound { position: Pubkey },

    // ========================================================================
    // Configuration Errors
    // ========================================================================

    /// Invalid configuration
    #[error("Invalid configuration for '{component}': {reason}")]
    InvalidConfiguration { component: String, reason: String },
}

impl CalidaError {
    /// Create a math overflow error with context
    pub fn math_overflow(operation: &str, values: &[&str]) -> Self {
        Self::MathOverflow {
            operation: operation.to_string(),
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a math underflow error with context
    pub fn math_underflow(operation: &str, values: &[&str]) -> Self {
        Self::MathUnderflow {
            operation: operation.to_string(),
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a division by zero error
    pub fn division_by_zero(context: &str) -> Self {
        Self::DivisionByZero {
            context: context.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, value: &str, expected: &str) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(caller: Pubkey, required: Pubkey) -> Self {
        Self::Unauthorized { caller, required }
    }

    pub fn already_initialized(component: &str) -> Self {
        Self::AlreadyInitialized {
            component: component.to_string(),
        }
    }

    pub fn not_initialized(component: &str) -> Self {
        Self::NotInitialized {
            component: component.to_string(),
        }
    }

    /// Create an insufficient balance error
    pub fn insufficient_balance(required: u128, available: u128) -> Self {
        Self::InsufficientBalance { required, available }
    }

    /// Create an external call error
    pub fn external(operation: &str, reason: &str) -> Self {
        Self::ExternalCall {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(component: &str, reason: &str) -> Self {
        Self::InvalidConfiguration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the whole operation can be retried unchanged with fresh hints.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HintStale { .. })
    }
}

/// Result type alias using the shared error type
pub type CalidaResult<T> = std::result::Result<T, CalidaError>;
