//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Process supervisor
//!
//! Owns one OS process per account. The supervisor has no networking: asking
//! a client to exit is the caller's job, the supervisor only waits, kills and
//! releases.

use crate::{Result, ServiceError};
use marionette_protocol::AccountId;
use marionette_protocol::consts::MANAGER_ADDR_ENV;
use metrics::counter;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Time allowed for a killed process to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Information about a supervised process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    /// Account the process runs for
    pub account: AccountId,
    /// OS process id
    pub pid: Option<u32>,
    /// Executable that was launched
    pub executable: PathBuf,
    /// When the process was spawned
    pub started_at: Instant,
}

/// Result of a non-blocking process check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The process is alive
    Running,
    /// The process exited and its handle was released
    Exited(ExitStatus),
    /// No process is supervised for the account
    Absent,
}

/// How a stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No process was running
    NotRunning,
    /// The process exited within the grace period
    Exited(ExitStatus),
    /// The process was force-killed
    Killed,
}

struct SupervisedProcess {
    handle: ProcessHandle,
    child: tokio::sync::Mutex<Child>,
}

/// Spawns, watches and terminates account processes
#[derive(Default)]
pub struct ProcessSupervisor {
    leading_args: Vec<String>,
    manager_addr: Option<SocketAddr>,
    processes: Mutex<HashMap<AccountId, Arc<SupervisedProcess>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor with no leading arguments
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the arguments placed before the account id
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the manager address handed to clients through the environment
    pub fn with_manager_addr(mut self, addr: SocketAddr) -> Self {
        self.manager_addr = Some(addr);
        self
    }

    fn table(&self) -> MutexGuard<'_, HashMap<AccountId, Arc<SupervisedProcess>>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, account: AccountId) -> Option<Arc<SupervisedProcess>> {
        self.table().get(&account).cloned()
    }

    /// Launch the client for an account
    ///
    /// The command line is `<executable> [leading args] <account id>`; the
    /// working directory is the executable's directory.
    pub fn start(&self, account: AccountId, executable: &Path) -> Result<ProcessHandle> {
        if !executable.is_file() {
            return Err(ServiceError::ExecutableNotFound(executable.to_path_buf()));
        }

        let mut table = self.table();
        if let Some(existing) = table.get(&account) {
            if is_alive(existing) {
                return Err(ServiceError::AlreadyRunning(account));
            }
            debug!(account = %account, "Replacing exited process entry");
            table.remove(&account);
        }

        let mut command = Command::new(executable);
        command
            .args(&self.leading_args)
            .arg(account.as_u64().to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        if let Some(addr) = self.manager_addr {
            command.env(MANAGER_ADDR_ENV, addr.to_string());
        }

        let child = command.spawn().map_err(|err| {
            error!(account = %account, executable = %executable.display(), error = %err, "Failed to spawn process");
            ServiceError::Io(err)
        })?;

        let handle = ProcessHandle {
            account,
            pid: child.id(),
            executable: executable.to_path_buf(),
            started_at: Instant::now(),
        };
        table.insert(
            account,
            Arc::new(SupervisedProcess {
                handle: handle.clone(),
                child: tokio::sync::Mutex::new(child),
            }),
        );
        drop(table);

        counter!("marionette.processes.started").increment(1);
        info!(account = %account, pid = ?handle.pid, "Process started");
        Ok(handle)
    }

    /// Check if a live process exists for an account
    pub fn is_running(&self, account: AccountId) -> bool {
        self.entry(account).is_some_and(|process| is_alive(&process))
    }

    /// Get the handle of the process for an account
    pub fn handle(&self, account: AccountId) -> Option<ProcessHandle> {
        self.entry(account).map(|process| process.handle.clone())
    }

    /// Non-blocking exit check
    ///
    /// An exited process is released before this returns.
    pub fn poll_exit(&self, account: AccountId) -> ProcessState {
        let Some(process) = self.entry(account) else {
            return ProcessState::Absent;
        };
        // A stop in progress holds the child; it is still ours to finish
        let Ok(mut child) = process.child.try_lock() else {
            return ProcessState::Running;
        };
        match child.try_wait() {
            Ok(None) => ProcessState::Running,
            Ok(Some(status)) => {
                drop(child);
                self.release_entry(account, &process);
                counter!("marionette.processes.exited").increment(1);
                info!(account = %account, status = %status, "Process exited");
                ProcessState::Exited(status)
            }
            Err(err) => {
                warn!(account = %account, error = %err, "Unable to check process");
                ProcessState::Running
            }
        }
    }

    /// Wait up to `timeout` for the process to exit
    ///
    /// Returns `true` if the process is gone.
    pub async fn wait_for_exit(&self, account: AccountId, timeout: Duration) -> Result<bool> {
        let Some(process) = self.entry(account) else {
            return Ok(true);
        };
        let waited = tokio::time::timeout(timeout, async {
            let mut child = process.child.lock().await;
            child.wait().await
        })
        .await;
        match waited {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(err)) => Err(ServiceError::Io(err)),
            Err(_) => Ok(false),
        }
    }

    /// Force-kill the process for an account and release it
    pub async fn kill(&self, account: AccountId) -> Result<()> {
        let Some(process) = self.entry(account) else {
            return Ok(());
        };
        let result = kill_and_reap(&process).await;
        self.release_entry(account, &process);
        result
    }

    /// Wait up to `grace` for the process to exit, force-kill it otherwise
    ///
    /// The handle is always released.
    pub async fn stop(&self, account: AccountId, grace: Duration) -> Result<StopOutcome> {
        let Some(process) = self.entry(account) else {
            return Ok(StopOutcome::NotRunning);
        };

        let waited = tokio::time::timeout(grace, async {
            let mut child = process.child.lock().await;
            child.wait().await
        })
        .await;

        let outcome = match waited {
            Ok(Ok(status)) => {
                info!(account = %account, status = %status, "Process exited");
                counter!("marionette.processes.exited").increment(1);
                Ok(StopOutcome::Exited(status))
            }
            Ok(Err(err)) => {
                warn!(account = %account, error = %err, "Wait failed, killing");
                kill_and_reap(&process).await.map(|()| StopOutcome::Killed)
            }
            Err(_) => {
                warn!(account = %account, grace = ?grace, "Process did not exit in time, killing");
                kill_and_reap(&process).await.map(|()| StopOutcome::Killed)
            }
        };

        self.release_entry(account, &process);
        outcome
    }

    /// Forget the process for an account
    ///
    /// A process that is still running is killed when its handle drops.
    pub fn release(&self, account: AccountId) -> bool {
        self.table().remove(&account).is_some()
    }

    fn release_entry(&self, account: AccountId, process: &Arc<SupervisedProcess>) {
        let mut table = self.table();
        if table
            .get(&account)
            .is_some_and(|current| Arc::ptr_eq(current, process))
        {
            table.remove(&account);
            debug!(account = %account, "Process handle released");
        }
    }

    /// Kill every supervised process
    pub async fn kill_all(&self) {
        let drained: Vec<(AccountId, Arc<SupervisedProcess>)> = self.table().drain().collect();
        for (account, process) in drained {
            if let Err(err) = kill_and_reap(&process).await {
                warn!(account = %account, error = %err, "Failed to kill process");
            }
        }
    }

    /// Accounts with a supervised process
    pub fn accounts(&self) -> Vec<AccountId> {
        self.table().keys().copied().collect()
    }

    /// Number of supervised processes
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Check if no process is supervised
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("leading_args", &self.leading_args)
            .field("manager_addr", &self.manager_addr)
            .field("processes", &self.len())
            .finish()
    }
}

fn is_alive(process: &SupervisedProcess) -> bool {
    match process.child.try_lock() {
        Ok(mut child) => matches!(child.try_wait(), Ok(None)),
        Err(_) => true,
    }
}

async fn kill_and_reap(process: &SupervisedProcess) -> Result<()> {
    let mut child = process.child.lock().await;
    if let Ok(Some(_)) = child.try_wait() {
        return Ok(());
    }
    if let Err(err) = child.start_kill() {
        // Exited between the check and the kill
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        return Err(ServiceError::Io(err));
    }
    counter!("marionette.processes.killed").increment(1);
    info!(account = %process.handle.account, pid = ?process.handle.pid, "Process killed");
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(ServiceError::Io(err)),
        Err(_) => Err(ServiceError::Timeout),
    }
}
