//! Task supervision for the producer and receiver.
//!
//! Every long-running task is spawned into one `JoinSet`. The first task
//! failure (or the stop signal) flips the shared shutdown flag; the
//! supervisor then waits for the remaining tasks to wind down.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub type BoxedTask<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;

/// Resolves on Ctrl-C. If the handler cannot be installed the future never
/// resolves and the process runs until a task fails.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Run `tasks` until `stop` resolves or one of them fails.
///
/// A task that returns `Ok` before shutdown is not fatal: it has finished
/// its work and the others keep running. Returns the first failure.
pub async fn supervise<E>(
    tasks: Vec<(&'static str, BoxedTask<E>)>,
    shutdown: watch::Sender<bool>,
    stop: impl Future<Output = ()>,
) -> Result<(), Box<dyn Error>>
where
    E: Error + Send + 'static,
{
    let mut set = JoinSet::new();
    for (name, task) in tasks {
        info!(task = name, "Starting task");
        set.spawn(async move { (name, task.await) });
    }

    tokio::pin!(stop);
    let mut stopping = false;
    let mut first_error: Option<Box<dyn Error>> = None;

    loop {
        tokio::select! {
            _ = &mut stop, if !stopping => {
                stopping = true;
                let _ = shutdown.send(true);
            }
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((name, Ok(())))) => {
                    if stopping {
                        info!(task = name, "Task stopped");
                    } else {
                        info!(task = name, "Task finished its work");
                    }
                }
                Some(Ok((name, Err(e)))) => {
                    error!(task = name, error = %e, "Task failed, shutting down");
                    if first_error.is_none() {
                        first_error = Some(Box::new(e));
                    }
                    stopping = true;
                    let _ = shutdown.send(true);
                }
                Some(Err(e)) => {
                    error!(error = %e, "Task panicked or was cancelled, shutting down");
                    if first_error.is_none() {
                        first_error = Some(Box::new(e));
                    }
                    stopping = true;
                    let _ = shutdown.send(true);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::time::Duration;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl Error for Boom {}

    fn until_shutdown(mut rx: watch::Receiver<bool>) -> BoxedTask<Boom> {
        Box::pin(async move {
            let _ = rx.changed().await;
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_remaining_tasks() {
        let (tx, rx) = watch::channel(false);
        let tasks: Vec<(&'static str, BoxedTask<Boom>)> = vec![
            ("waiter", until_shutdown(rx)),
            (
                "failing",
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(Boom)
                }),
            ),
        ];

        let result = supervise(tasks, tx, std::future::pending()).await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_task_is_not_fatal() {
        let (tx, rx) = watch::channel(false);
        let tasks: Vec<(&'static str, BoxedTask<Boom>)> = vec![
            ("done", Box::pin(async { Ok(()) })),
            ("waiter", until_shutdown(rx)),
        ];

        let stop = tokio::time::sleep(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        supervise(tasks, tx, stop).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
