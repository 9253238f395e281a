use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::time::{sleep_until, Instant, Sleep};

/// A resettable point in time after which an I/O operation fails
///
/// The timer behind it is only armed once an operation actually has to wait.
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    /// Move the deadline, or clear it with `None`
    ///
    /// Operations already waiting must be woken by the caller to observe the change.
    pub fn set(&mut self, at: Option<Instant>) {
        self.at = at;
        match (at, self.timer.as_mut()) {
            (Some(at), Some(timer)) => timer.as_mut().reset(at),
            _ => self.timer = None,
        }
    }

    /// The current deadline
    pub fn get(&self) -> Option<Instant> {
        self.at
    }

    /// Whether the deadline has passed
    ///
    /// If it hasn't, `cx` is woken once it does.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(at) = self.at else {
            return false;
        };
        if at <= Instant::now() {
            return true;
        }
        let timer = self.timer.get_or_insert_with(|| Box::pin(sleep_until(at)));
        matches!(timer.as_mut().poll(cx), Poll::Ready(()))
    }
}

/// The error returned by operations whose deadline has passed
pub fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}
