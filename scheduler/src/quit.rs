use tokio::sync::watch;

/// The caller's half of a quit signal: call `signal()` to ask every loop
/// watching the paired [`Quit`] to stop after its current tick.
#[derive(Clone)]
pub struct QuitHandle(watch::Sender<bool>);

/// A loop's half of a quit signal.
#[derive(Clone)]
pub struct Quit(watch::Receiver<bool>);

impl QuitHandle {
    pub fn signal(&self) {
        let _ = self.0.send(true);
    }
}

impl Quit {
    /// Resolves once quit has been signaled; a tick in progress still runs
    /// to completion, since this is only awaited between ticks.
    pub async fn signaled(&mut self) {
        loop {
            if *self.0.borrow() {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }
}

pub fn channel() -> (QuitHandle, Quit) {
    let (tx, rx) = watch::channel(false);
    (QuitHandle(tx), Quit(rx))
}
