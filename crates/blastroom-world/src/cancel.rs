//! Per-bomb cancellation signal.
//!
//! Every bomb owns one [`CancelSignal`]. Push animations that move the bomb
//! hold a [`CancelListener`] and stop as soon as it fires. Firing never
//! blocks and never fails: if nobody is listening the offer is simply lost.

use tokio::sync::broadcast;

/// Sending half, owned by the bomb. Consumed on use.
#[derive(Debug)]
pub struct CancelSignal {
    tx: broadcast::Sender<()>,
}

/// Receiving half, held by a task animating the bomb.
#[derive(Debug)]
pub struct CancelListener {
    rx: broadcast::Receiver<()>,
}

impl CancelSignal {
    /// Create a fresh, unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self { tx }
    }

    /// Attach a new listener.
    pub fn listen(&self) -> CancelListener {
        CancelListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Offer the signal to every current listener.
    ///
    /// Returns the number of listeners that were notified (zero when no
    /// animation was running).
    pub fn offer(self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelListener {
    /// Resolve once the signal fires or its bomb is dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn offer_without_listeners_is_harmless() {
        let signal = CancelSignal::new();
        assert_eq!(signal.offer(), 0);
    }

    #[tokio::test]
    async fn listeners_observe_the_offer() {
        let signal = CancelSignal::new();
        let mut a = signal.listen();
        let mut b = signal.listen();
        assert_eq!(signal.offer(), 2);
        a.cancelled().await;
        b.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unfired_signal_keeps_listener_pending() {
        let signal = CancelSignal::new();
        let mut listener = signal.listen();
        let waited =
            tokio::time::timeout(Duration::from_secs(5), listener.cancelled()).await;
        assert!(waited.is_err());
        drop(signal);
    }

    #[tokio::test]
    async fn dropping_the_bomb_releases_listeners() {
        let signal = CancelSignal::new();
        let mut listener = signal.listen();
        drop(signal);
        listener.cancelled().await;
    }
}
