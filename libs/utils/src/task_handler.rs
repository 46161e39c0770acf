// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Cancellable task sets for long running server tasks.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

type TaskResult = (&'static str, Result<(), std::io::Error>);

/// A [JoinSet] of named server tasks bound to one [CancellationToken].
///
/// Cancelling the token stops every task spawned with
/// [CancelTaskSet::spawn_cancellable_task]. A failing task cancels the token
/// as well, so one broken listener shuts the whole process down.
pub struct CancelTaskSet {
    join_set: JoinSet<TaskResult>,
    cancellation_token: CancellationToken,
}

impl CancelTaskSet {
    /// Creates a new task set with a fresh cancellation token.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::from_cancel_token(false, CancellationToken::new())
    }

    /// Creates a task set that cancels itself on `SIGINT` or `SIGTERM`.
    pub fn new_with_signal_handler() -> Self {
        Self::from_cancel_token(true, CancellationToken::new())
    }

    /// Creates a task set around an existing cancellation token.
    pub fn from_cancel_token(
        register_signal_handler: bool,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut set = CancelTaskSet {
            join_set: JoinSet::new(),
            cancellation_token,
        };
        if register_signal_handler {
            set.spawn_shutdown_handler();
        }
        set
    }

    /// Returns a clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Number of tasks that have not been joined yet.
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    /// Returns true if no task is pending.
    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    fn spawn_shutdown_handler(&mut self) {
        let token = self.cancellation_token();
        self.join_set.spawn(async move {
            let result = wait_for_signal(&token).await;
            token.cancel();
            ("shutdown-handler", result)
        });
    }

    /// Spawns a task that observes [Self::cancellation_token] itself, for
    /// servers that shut down gracefully.
    pub fn spawn_task<Fut>(&mut self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = Result<(), std::io::Error>> + Send + 'static,
    {
        self.join_set.spawn(async move { (name, task.await) });
    }

    /// Spawns a task that runs until it completes or the token is cancelled.
    pub fn spawn_cancellable_task<Fut>(&mut self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = Result<(), std::io::Error>> + Send + 'static,
    {
        let token = self.cancellation_token();
        self.join_set.spawn(async move {
            match token.run_until_cancelled(task).await {
                Some(result) => (name, result),
                None => {
                    debug!(task = name, "Task cancelled");
                    (name, Ok(()))
                }
            }
        });
    }

    /// Joins every task. The first failure cancels the token so the remaining
    /// tasks shut down gracefully; it is returned once all tasks are joined.
    pub async fn join_all(&mut self) -> Result<(), std::io::Error> {
        let mut first_error = None;
        while let Some(joined) = self.join_set.join_next().await {
            let failure = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((name, Err(e))) => {
                    error!(task = name, error = %e, "Task failed");
                    e
                }
                Err(e) => {
                    error!(error = %e, "Task join failed");
                    std::io::Error::other(e)
                }
            };
            self.cancellation_token.cancel();
            first_error.get_or_insert(failure);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for CancelTaskSet {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
        self.join_set.abort_all();
    }
}

#[cfg(target_family = "unix")]
async fn wait_for_signal(token: &CancellationToken) -> Result<(), std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => debug!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => debug!("Received SIGTERM, shutting down"),
        _ = token.cancelled() => {},
    }
    Ok(())
}

#[cfg(not(target_family = "unix"))]
async fn wait_for_signal(token: &CancellationToken) -> Result<(), std::io::Error> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            debug!("Received CTRL-C, shutting down");
        },
        _ = token.cancelled() => {},
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn cancel_stops_pending_tasks() {
        let mut set = CancelTaskSet::new();
        set.spawn_cancellable_task("sleeper", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        set.cancellation_token().cancel();
        tokio::time::timeout(Duration::from_secs(5), set.join_all())
            .await
            .expect("tasks did not stop")
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn failing_task_cancels_siblings() {
        let mut set = CancelTaskSet::new();
        let token = set.cancellation_token();
        set.spawn_cancellable_task("sleeper", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        set.spawn_cancellable_task("broken", async {
            Err(std::io::Error::other("listener died"))
        });

        let err = tokio::time::timeout(Duration::from_secs(5), set.join_all())
            .await
            .expect("tasks did not stop")
            .unwrap_err();
        assert_eq!(err.to_string(), "listener died");
        assert!(token.is_cancelled());
    }
}
