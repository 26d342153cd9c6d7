use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

/// Trailing-edge debounce on the tokio timer.
///
/// Each [`push`](Debouncer::push) restarts the quiet period; only the value
/// that survives a full quiet period is delivered on the receiver. Dropping
/// the debouncer cancels the pending timer, after which the receiver yields
/// `None`.
pub struct Debouncer<T> {
    quiet: Duration,
    generation: Arc<AtomicU64>,
    sender: mpsc::UnboundedSender<(u64, T)>,
    pending: Option<JoinHandle<()>>,
}

/// Receiving end of a [`Debouncer`].
///
/// Emissions are stamped with the generation that produced them. Anything
/// queued before a later `push` or `cancel` is skipped, even if its quiet
/// period had already elapsed.
pub struct Debounced<T> {
    generation: Arc<AtomicU64>,
    receiver: mpsc::UnboundedReceiver<(u64, T)>,
}

impl<T> Debounced<T> {
    /// Cancellation safe.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let (generation, value) = self.receiver.recv().await?;
            if self.is_current(generation) {
                return Some(value);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        loop {
            let (generation, value) = self.receiver.try_recv()?;
            if self.is_current(generation) {
                return Ok(value);
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    pub fn new(quiet: Duration) -> (Self, Debounced<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let debouncer = Self {
            quiet,
            generation: Arc::clone(&generation),
            sender,
            pending: None,
        };
        (
            debouncer,
            Debounced {
                generation,
                receiver,
            },
        )
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    pub fn push(&mut self, value: T) {
        self.cancel();

        let generation = self.generation.load(Ordering::SeqCst);
        let current = Arc::clone(&self.generation);
        let sender = self.sender.clone();
        let quiet = self.quiet;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if current.load(Ordering::SeqCst) == generation {
                let _ = sender.send((generation, value));
            }
        }));
    }

    /// Drops any pending emission, including one already queued but not yet
    /// received.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
