use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    #[error("Configuration Error: {reason}")]
    ConfigError { reason: String },

    #[error("Input Error: {reason}")]
    InputError { reason: String },

    #[error("Tool Error: {tool} exited with code {code}")]
    ToolError { tool: String, code: i32 },
}
