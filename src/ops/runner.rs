//! Script Runner
//! Mission: Run named operations in the external script installation

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Outcome of one external operation.
#[derive(Debug, Clone)]
pub struct OpResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl OpResult {
    fn ok(output: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    fn fail(error: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
        }
    }
}

/// Run a shell command and capture its trimmed stdout.
///
/// Failure to spawn, a non-zero exit, or stderr output with empty stdout all
/// count as operation failure; the scripts signal soft errors on stderr.
pub async fn run_command(command: &str) -> OpResult {
    debug!("running command: {}", command);

    let output = match Command::new("sh").arg("-c").arg(command).output().await {
        Ok(output) => output,
        Err(err) => return OpResult::fail(err.to_string()),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let error = if stderr.is_empty() {
            format!("command exited with {}", output.status)
        } else {
            stderr
        };
        return OpResult::fail(error);
    }

    if stdout.is_empty() && !stderr.is_empty() {
        return OpResult::fail(stderr);
    }

    OpResult::ok(stdout)
}

/// Handle on the external script installation.
///
/// Modules live under `<base>/modules/<name>.sh`; collaborator status files
/// under `<base>/data/`. This type never interprets what the scripts do.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    base: PathBuf,
}

impl ScriptRunner {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of a collaborator-produced status file.
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.base.join("data").join(name)
    }

    /// Source a module script and invoke one of its functions with
    /// positional string arguments.
    pub async fn run_function(&self, module: &str, function: &str, args: &[&str]) -> OpResult {
        let quoted: Vec<String> = args.iter().map(|a| format!("\"{}\"", a)).collect();
        let script = format!(
            "source {}/modules/{}.sh && {} {}",
            self.base.display(),
            module,
            function,
            quoted.join(" ")
        );

        debug!("running function: {}::{}", module, function);

        let output = match Command::new("bash").arg("-c").arg(&script).output().await {
            Ok(output) => output,
            Err(err) => return OpResult::fail(err.to_string()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let error = if stderr.is_empty() {
                format!("{}::{} exited with {}", module, function, output.status)
            } else {
                stderr
            };
            return OpResult::fail(error);
        }

        OpResult::ok(stdout)
    }
}
