//! Node Process Launching
//!
//! The coordinator is the only component with a system-level side effect:
//! spawning and terminating node child processes. That effect is isolated
//! behind the [`NodeLauncher`] seam so the rest of the coordinator deals in
//! opaque handles, and tests can substitute a launcher that records launch
//! requests instead of forking.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::NodeRole;

/// Everything needed to start one node process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub node_id: String,
    pub port: u16,
    pub role: NodeRole,
    pub leader_url: Option<String>,
    pub registry_url: String,
    /// Seconds, forwarded verbatim to the child's --replication-delay
    pub replication_delay: Option<String>,
}

impl LaunchSpec {
    /// Argument vector for the `node` subcommand of the main binary
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "node".to_string(),
            "--port".to_string(),
            self.port.to_string(),
            "--id".to_string(),
            self.node_id.clone(),
            "--role".to_string(),
            self.role.to_string(),
            "--registry".to_string(),
            self.registry_url.clone(),
        ];
        if let Some(leader_url) = &self.leader_url {
            args.push("--leader-url".to_string());
            args.push(leader_url.clone());
        }
        if let Some(delay) = &self.replication_delay {
            args.push("--replication-delay".to_string());
            args.push(delay.clone());
        }
        args
    }
}

/// Opaque handle to a launched node process
#[async_trait]
pub trait NodeProcess: Send + Sync {
    /// Terminate the process, reaping it
    async fn terminate(&mut self) -> Result<()>;

    /// Wait for the process to exit, returning its exit code if any
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// OS process id, if still running
    fn pid(&self) -> Option<u32>;
}

/// Launches node processes
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn NodeProcess>>;
}

/// Production launcher: re-invokes this executable with the `node` subcommand
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    /// Launcher that spawns the currently running executable
    pub fn from_current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::Launch(format!("cannot resolve current executable: {e}")))?;
        Ok(Self { program })
    }

    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[async_trait]
impl NodeLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn NodeProcess>> {
        let child = tokio::process::Command::new(&self.program)
            .args(spec.to_args())
            .spawn()
            .map_err(|e| Error::Launch(format!("{}: {e}", spec.node_id)))?;

        tracing::info!(
            node_id = %spec.node_id,
            port = spec.port,
            pid = child.id(),
            "launched node process"
        );

        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: tokio::process::Child,
}

#[async_trait]
impl NodeProcess for ChildProcess {
    async fn terminate(&mut self) -> Result<()> {
        // kill() also reaps, so no zombie is left behind
        self.child
            .kill()
            .await
            .map_err(|e| Error::Launch(format!("terminate failed: {e}")))?;
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::Launch(format!("wait failed: {e}")))?;
        Ok(status.code())
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Test launcher: records every launch request and hands out inert handles
#[derive(Default)]
pub struct RecordingLauncher {
    pub launched: std::sync::Mutex<Vec<LaunchSpec>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeLauncher for RecordingLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn NodeProcess>> {
        self.launched.lock().unwrap().push(spec.clone());
        Ok(Box::new(InertProcess))
    }
}

struct InertProcess;

#[async_trait]
impl NodeProcess for InertProcess {
    async fn terminate(&mut self) -> Result<()> {
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        Ok(Some(0))
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_spec_builds_node_subcommand_args() {
        let spec = LaunchSpec {
            node_id: "follower-2".to_string(),
            port: 7003,
            role: NodeRole::Follower,
            leader_url: Some("http://127.0.0.1:7001".to_string()),
            registry_url: "http://127.0.0.1:9000".to_string(),
            replication_delay: Some("0.5".to_string()),
        };

        let args = spec.to_args();
        assert_eq!(args[0], "node");
        assert!(args.contains(&"--role".to_string()));
        assert!(args.contains(&"follower".to_string()));
        assert!(args.contains(&"--leader-url".to_string()));
        assert!(args.contains(&"0.5".to_string()));
    }

    #[test]
    fn leader_spec_omits_leader_url() {
        let spec = LaunchSpec {
            node_id: "leader".to_string(),
            port: 7001,
            role: NodeRole::Leader,
            leader_url: None,
            registry_url: "http://127.0.0.1:9000".to_string(),
            replication_delay: None,
        };

        let args = spec.to_args();
        assert!(!args.contains(&"--leader-url".to_string()));
        assert!(!args.contains(&"--replication-delay".to_string()));
    }

    #[tokio::test]
    async fn recording_launcher_tracks_requests() {
        let launcher = RecordingLauncher::new();
        let spec = LaunchSpec {
            node_id: "follower-1".to_string(),
            port: 7002,
            role: NodeRole::Follower,
            leader_url: None,
            registry_url: "http://127.0.0.1:9000".to_string(),
            replication_delay: None,
        };

        let mut handle = launcher.launch(&spec).await.unwrap();
        assert_eq!(launcher.launch_count(), 1);
        assert!(handle.terminate().await.is_ok());
        assert_eq!(handle.wait().await.unwrap(), Some(0));
    }
}
