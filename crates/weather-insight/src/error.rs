use crate::config::ConfigError;
use crate::model::ValidationError;
use crate::providers::ProviderError;
use crate::providers::gemini::GenerationError;

pub const ERROR_CODE_USER_INVALID_INPUT: &str = "user.invalid_input";
pub const ERROR_CODE_USER_INVALID_CONFIG: &str = "user.invalid_config";
pub const ERROR_CODE_USER_MISSING_API_KEY: &str = "user.missing_api_key";
pub const ERROR_CODE_USER_LOCATION_NOT_FOUND: &str = "user.location_not_found";
pub const ERROR_CODE_USER_AUTH_REJECTED: &str = "user.auth_rejected";
pub const ERROR_CODE_USER_INPUT_UNREADABLE: &str = "user.input_unreadable";
pub const ERROR_CODE_RUNTIME_PROVIDER_FAILED: &str = "runtime.provider_failed";
pub const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
pub const ERROR_CODE_RUNTIME_GENERATION_FAILED: &str = "runtime.generation_failed";
pub const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";
pub const ERROR_CODE_RUNTIME_IO: &str = "runtime.io_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Runtime,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::User => "user",
            ErrorKind::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn user(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            code,
            message: message.into(),
        }
    }

    pub fn runtime(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::user(ERROR_CODE_USER_INVALID_INPUT, message)
    }

    pub fn missing_api_key(env_key: &str) -> Self {
        Self::user(
            ERROR_CODE_USER_MISSING_API_KEY,
            format!("{env_key} is not configured"),
        )
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::User => 2,
            ErrorKind::Runtime => 1,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error[{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_input(value.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::user(ERROR_CODE_USER_INVALID_CONFIG, value.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Lookup(_) => {
                Self::user(ERROR_CODE_USER_LOCATION_NOT_FOUND, value.to_string())
            }
            ProviderError::Auth(_) => Self::user(ERROR_CODE_USER_AUTH_REJECTED, value.to_string()),
            ProviderError::Transport(_)
            | ProviderError::Http { .. }
            | ProviderError::InvalidResponse(_) => {
                Self::runtime(ERROR_CODE_RUNTIME_PROVIDER_FAILED, value.to_string())
            }
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        match value {
            GenerationError::Auth(_) => {
                Self::user(ERROR_CODE_USER_AUTH_REJECTED, value.to_string())
            }
            GenerationError::Transport(_)
            | GenerationError::Http { .. }
            | GenerationError::InvalidResponse(_)
            | GenerationError::EmptyResponse(_) => {
                Self::runtime(ERROR_CODE_RUNTIME_GENERATION_FAILED, value.to_string())
            }
        }
    }
}
