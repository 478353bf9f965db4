//! Single-fire completion handles for callback-style protected calls.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Shared state between a promise and the breaker waiting on it.
pub(crate) struct Slot<T, E> {
    invocation: u64,
    settled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<Result<T, E>>>>,
}

impl<T, E> Slot<T, E> {
    /// Claim the invocation. Returns false if it was already settled.
    pub(crate) fn claim(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }
}

/// Completion handle handed to code run by
/// [`CircuitBreaker::execute_with_promise`](crate::CircuitBreaker::execute_with_promise).
///
/// The first completion wins, whether it comes from the code or from the
/// breaker's deadline. Later completions are discarded and reported as such.
pub struct Promise<T, E> {
    slot: Arc<Slot<T, E>>,
}

impl<T, E> Promise<T, E> {
    pub(crate) fn channel(invocation: u64) -> (Self, Arc<Slot<T, E>>, oneshot::Receiver<Result<T, E>>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Slot {
            invocation,
            settled: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        });
        (Self { slot: Arc::clone(&slot) }, slot, rx)
    }

    /// Complete the call successfully. Returns false if the call was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Fail the call. Returns false if the call was already settled.
    pub fn fail(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// Settle the call with a result. Returns false if the call was already settled.
    pub fn settle(&self, result: Result<T, E>) -> bool {
        if !self.slot.claim() {
            debug!(invocation = self.slot.invocation, "Discarding late completion");
            return false;
        }

        if let Some(sender) = self.slot.sender.lock().take() {
            // The breaker may have stopped waiting (caller dropped the future).
            let _ = sender.send(result);
        }
        true
    }

    /// Whether the call has been settled by a completion or a timeout.
    pub fn is_settled(&self) -> bool {
        self.slot.settled.load(Ordering::Acquire)
    }

    /// Identifier of the invocation this promise belongs to.
    pub fn invocation_id(&self) -> u64 {
        self.slot.invocation
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T, E> std::fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("invocation", &self.slot.invocation)
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (promise, _slot, rx) = Promise::<i32, &str>::channel(7);
        let other = promise.clone();

        assert!(promise.complete(1));
        assert!(!other.fail("late"));
        assert!(other.is_settled());
        assert_eq!(other.invocation_id(), 7);

        assert_eq!(rx.await.unwrap(), Ok(1));
    }

    #[test]
    fn test_claimed_slot_rejects_completion() {
        let (promise, slot, _rx) = Promise::<i32, &str>::channel(1);

        assert!(slot.claim());
        assert!(!promise.complete(5));
    }
}
