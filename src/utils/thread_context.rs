//! A named background thread paired with a stop signal, so callers can start
//! a worker and later stop it without reaching into its internals.

use std::thread::{sleep, JoinHandle};
use std::time::Duration;

use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::utils::threads::spawn_named_thread;

const GRACEFUL_STOP_RETRY: u16 = 10;
const GRACEFUL_STOP_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// A cancellation message carries no payload; receiving one means "stop".
pub type CancellationMessage = ();

pub struct NotStartedThreadContext<F>
where
    F: FnOnce(EventConsumer<CancellationMessage>) + Send + 'static,
{
    thread_name: String,
    callback: F,
}

impl<F> NotStartedThreadContext<F>
where
    F: FnOnce(EventConsumer<CancellationMessage>) + Send + 'static,
{
    pub fn new<S: Into<String>>(thread_name: S, callback: F) -> Self {
        Self {
            thread_name: thread_name.into(),
            callback,
        }
    }

    pub fn start(self) -> StartedThreadContext {
        let (stop_publisher, stop_consumer) = pub_sub::<CancellationMessage>();

        StartedThreadContext::new(
            self.thread_name.clone(),
            stop_publisher,
            spawn_named_thread(&self.thread_name, move || {
                (self.callback)(stop_consumer);
            }),
        )
    }
}

pub struct StartedThreadContext {
    thread_name: String,
    stop_publisher: EventPublisher<CancellationMessage>,
    join_handle: JoinHandle<()>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThreadContextStopperError {
    #[error("error sending stop signal to '{0}' thread: {1}")]
    Publish(String, String),
    #[error("error joining '{0}' thread")]
    Join(String),
    #[error("timeout waiting for '{0}' thread to finish")]
    StopTimeout(String),
}

impl StartedThreadContext {
    pub fn new(
        thread_name: String,
        stop_publisher: EventPublisher<CancellationMessage>,
        join_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            thread_name,
            stop_publisher,
            join_handle,
        }
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Sends the stop signal and polls until the thread finishes or the
    /// bounded retry budget (1s total) is exhausted.
    pub fn stop(self) -> Result<(), ThreadContextStopperError> {
        self.stop_publisher
            .publish(())
            .map_err(|err| ThreadContextStopperError::Publish(self.thread_name.clone(), err.to_string()))?;

        for _ in 0..GRACEFUL_STOP_RETRY {
            if self.join_handle.is_finished() {
                return self.join_handle.join().map_err(|_| {
                    ThreadContextStopperError::Join(self.thread_name.clone())
                });
            }
            sleep(GRACEFUL_STOP_RETRY_INTERVAL);
        }

        Err(ThreadContextStopperError::StopTimeout(self.thread_name))
    }

    /// Sends the stop signal and blocks indefinitely for the thread to exit.
    pub fn stop_blocking(self) -> Result<(), ThreadContextStopperError> {
        self.stop_publisher
            .publish(())
            .map_err(|err| ThreadContextStopperError::Publish(self.thread_name.clone(), err.to_string()))?;
        self.join_handle
            .join()
            .map_err(|_| ThreadContextStopperError::Join(self.thread_name))
    }
}
