//! Local Process Adapter
//!
//! Implements `CommandRunner` with `tokio::process`.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::ports::CommandRunner;
use crate::error::{Error, Result};

/// Runs local programs and captures their stdout.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::probe(program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::probe(
                program,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        debug!(program = %program, bytes = output.stdout.len(), "Command finished");
        Ok(output.stdout)
    }
}
