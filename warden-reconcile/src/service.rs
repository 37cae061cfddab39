//! OS service manager seam for the daemon's own process.
//!
//! Reconciliation never manages the daemon process itself; it hands
//! enable/disable/start/stop/reload to a [`ServiceLifecycle`].

use std::process::Command;

use crate::error::{io_err, ReconcileError};

/// A lifecycle verb understood by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Enable,
    Disable,
    Start,
    Stop,
    Reload,
}

impl ServiceVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceVerb::Enable => "enable",
            ServiceVerb::Disable => "disable",
            ServiceVerb::Start => "start",
            ServiceVerb::Stop => "stop",
            ServiceVerb::Reload => "reload",
        }
    }
}

pub trait ServiceLifecycle {
    fn run(&self, verb: ServiceVerb, service: &str) -> Result<(), ReconcileError>;
}

/// `systemctl <verb> <service>`.
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: String,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }
}

impl Systemctl {
    /// Use a different executable with the same argument convention.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ServiceLifecycle for Systemctl {
    fn run(&self, verb: ServiceVerb, service: &str) -> Result<(), ReconcileError> {
        tracing::info!(verb = verb.as_str(), service, "service command");
        let output = Command::new(&self.program)
            .args([verb.as_str(), service])
            .output()
            .map_err(|e| io_err(&self.program, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Err(ReconcileError::Service(format!(
            "{} {} {} failed (status {}): {} {}",
            self.program,
            verb.as_str(),
            service,
            output.status,
            stdout,
            stderr
        )))
    }
}
