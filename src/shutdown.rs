//! Quit signal shared by every long-lived task, and the rendezvous used when shutting down.

use anyhow::anyhow;
use futures::future::{join_all, select_all};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::print::Logger;

/// Owner side of the quit signal.
#[derive(Debug)]
pub struct Quit {
    tx: watch::Sender<bool>,
}

/// Task side of the quit signal.
#[derive(Debug, Clone)]
pub struct QuitRx {
    rx: watch::Receiver<bool>,
}

impl Quit {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Quit { tx }
    }

    /// A receiver for one task.
    pub fn subscribe(&self) -> QuitRx {
        QuitRx { rx: self.tx.subscribe() }
    }

    /// Tells every task to stop.
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Quit {
    fn default() -> Self {
        Quit::new()
    }
}

impl QuitRx {
    /// Resolves once quit has been raised, or the [Quit] is gone.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|quit| *quit).await;
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Waits for every task to finish.
///
/// ## Returns
/// The first error reported by a task, or a join error if a task panicked.
/// All tasks are awaited before returning, also when one of them failed.
pub async fn rendezvous(tasks: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>, log: &Logger) -> anyhow::Result<()> {
    let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let mut first_err = None;
    for (name, joined) in names.into_iter().zip(join_all(handles).await) {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow!("task panicked: {}", e)),
        };
        match result {
            Ok(()) => log.ok("Task ended", &[("task", &name)]),
            Err(e) => {
                log.err("Task failed", &[("task", &name), ("error", &e)]);
                first_err.get_or_insert(e);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Waits until the first task in `tasks` ends, and takes it out of the list.
///
/// Never resolves if `tasks` is empty.
pub async fn first_exit(tasks: &mut Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>) -> (&'static str, anyhow::Result<()>) {
    if tasks.is_empty() {
        return std::future::pending().await;
    }
    let (joined, index, rest) = select_all(tasks.iter_mut().map(|(_, handle)| handle)).await;
    drop(rest);
    let (name, _) = tasks.remove(index);
    let result = joined.unwrap_or_else(|e| Err(anyhow!("task panicked: {}", e)));
    (name, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_raise() {
        let quit = Quit::new();
        let mut rx = quit.subscribe();
        assert!(!rx.is_raised());

        let handle = tokio::spawn(async move {
            rx.wait().await;
        });
        quit.raise();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn subscribe_after_raise_sees_quit() {
        let quit = Quit::new();
        quit.raise();
        let mut rx = quit.subscribe();
        assert!(rx.is_raised());
        tokio::time::timeout(Duration::from_secs(1), rx.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn rendezvous_reports_failure_after_joining_all() {
        let ok = tokio::spawn(async { Ok(()) });
        let failed = tokio::spawn(async { Err(anyhow!("store closed")) });
        let res = rendezvous(vec![("ok", ok), ("failed", failed)], &Logger::silent()).await;
        assert!(res.unwrap_err().to_string().contains("store closed"));
    }

    #[tokio::test]
    async fn first_exit_takes_out_the_finished_task() {
        let quit = Quit::new();
        let mut rx = quit.subscribe();
        let waiting = tokio::spawn(async move {
            rx.wait().await;
            Ok(())
        });
        let failed = tokio::spawn(async { Err(anyhow!("bad message")) });
        let mut tasks = vec![("waiting", waiting), ("failed", failed)];

        let (name, result) = first_exit(&mut tasks).await;
        assert_eq!(name, "failed");
        assert!(result.is_err());
        assert_eq!(tasks.len(), 1);

        quit.raise();
        rendezvous(tasks, &Logger::silent()).await.unwrap();
    }
}
