use std::future::Future;
use std::time::Duration;

use crate::Quit;

/// Config for [`run_loop`].
#[derive(Clone, Copy, Debug)]
pub struct LoopConfig {
    pub initial_wait: Duration,
    pub retry_wait: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            initial_wait: Duration::ZERO,
            retry_wait: Duration::from_secs(60),
        }
    }
}

/// Sleeps `initial_wait`, runs `tick` once, then repeats every `retry_wait`.
/// Terminates only when `quit` is signaled between ticks; a tick in
/// progress always runs to completion.
///
/// Not reentrant: the next tick is a sleep *after* the previous one
/// returns, so overlapping executions of `tick` cannot happen and a slow
/// tick simply defers the following one.
pub async fn run_loop<F, Fut>(mut quit: Quit, config: LoopConfig, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(config.initial_wait) => {}
        _ = quit.signaled() => return,
    }

    loop {
        if quit.is_signaled() {
            return;
        }
        tick().await;

        tokio::select! {
            _ = tokio::time::sleep(config.retry_wait) => {}
            _ = quit.signaled() => return,
        }
    }
}
