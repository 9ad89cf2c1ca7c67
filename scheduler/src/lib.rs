mod periodic;
mod quit;
mod retry;

pub use periodic::{LoopConfig, run_loop};
pub use quit::{Quit, QuitHandle, channel};
pub use retry::{Error, RetryConfig, retry};
