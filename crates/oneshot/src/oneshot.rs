use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::errors::SendError;
use crate::ReceiveError;

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

pub struct OneshotSender<T> {
    slot: Arc<Slot<T>>,
}

pub struct OneshotReceiver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> OneshotSender<T> {
    /// Sends the oneshot value to the receiver. Never blocks.
    ///
    /// The sender is consumed so the resources are released
    /// and no other thread can send again.
    pub fn send(self, value: T) -> Result<(), SendError> {
        match Arc::try_unwrap(self.slot) {
            // We are the only owner left: the receiver is gone.
            Ok(_) => Err(SendError::Closed),
            Err(slot) => {
                let mut guard = slot.value.lock().unwrap_or_else(PoisonError::into_inner);
                *guard = Some(value);
                slot.ready.notify_one();

                Ok(())
            }
        }
    }
}

impl<T> OneshotReceiver<T> {
    /// Blocks until the value is available.
    /// The value is made available by the sender when send is called.
    pub fn recv(self) -> Result<T, ReceiveError> {
        match Arc::try_unwrap(self.slot) {
            // The sender is gone, but it may have left a value behind.
            Ok(slot) => {
                let mut guard = slot.value.lock().unwrap_or_else(PoisonError::into_inner);
                guard.take().ok_or(ReceiveError::Closed)
            }
            Err(slot) => {
                let mut guard = slot
                    .value
                    .lock()
                    .map_err(|err| ReceiveError::Other(err.to_string()))?;

                loop {
                    if let Some(value) = guard.take() {
                        return Ok(value);
                    }
                    guard = slot
                        .ready
                        .wait(guard)
                        .map_err(|err| ReceiveError::Other(err.to_string()))?;
                }
            }
        }
    }
}

/// Creates a oneshot channel. The channel is composed of a sender and a
/// receiver, both consumed by their first (and only) use.
///
/// ## Example
///
/// ```
/// use std::thread;
/// use oneshot::channel;
///
/// let (tx, rx) = channel::<u64>();
///
/// thread::spawn(move || {
///     tx.send(69).unwrap();
/// });
///
/// let value = match rx.recv() {
///     Ok(num) => num,
///     Err(_) => unreachable!(),
/// };
///
/// assert_eq!(value, 69);
/// ```
pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let slot = Arc::new(Slot {
        value: Mutex::new(None),
        ready: Condvar::new(),
    });

    (
        OneshotSender {
            slot: Arc::clone(&slot),
        },
        OneshotReceiver { slot },
    )
}
