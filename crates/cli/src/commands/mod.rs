pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;

/// What went wrong, as seen by scripts driving the CLI. Each kind owns a
/// stable exit code and the `error_class` reported in the JSON line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// At least one `doctor` readiness check did not pass.
    ChecksFailed,
    ConfigValidation,
    RuntimeInit,
    DbConnectivity,
    Migration,
}

impl FailureKind {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ChecksFailed => 1,
            Self::ConfigValidation => 2,
            Self::RuntimeInit => 3,
            Self::DbConnectivity => 4,
            Self::Migration => 5,
        }
    }

    pub fn error_class(self) -> &'static str {
        match self {
            Self::ChecksFailed => "readiness_checks",
            Self::ConfigValidation => "config_validation",
            Self::RuntimeInit => "runtime_init",
            Self::DbConnectivity => "db_connectivity",
            Self::Migration => "migration",
        }
    }
}

/// Process exit code plus the single line printed to stdout.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'static str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        let outcome =
            Outcome { command, status: "ok", error_class: None, message: message.as_ref() };
        Self { exit_code: 0, output: outcome.to_line() }
    }

    pub fn failure(command: &str, kind: FailureKind, message: impl AsRef<str>) -> Self {
        let outcome = Outcome {
            command,
            status: "error",
            error_class: Some(kind.error_class()),
            message: message.as_ref(),
        };
        Self { exit_code: kind.exit_code(), output: outcome.to_line() }
    }

    /// Pre-rendered output (e.g. the `doctor` report) with the exit code of
    /// `kind`, or 0 when there is no failure.
    pub fn rendered(output: String, failure: Option<FailureKind>) -> Self {
        Self { exit_code: failure.map_or(0, FailureKind::exit_code), output }
    }
}

impl Outcome<'_> {
    fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(error) => serde_json::json!({
                "command": self.command,
                "status": "error",
                "error_class": "serialization",
                "message": error.to_string(),
            })
            .to_string(),
        }
    }
}
