use std::fmt::Debug;
use tokio::sync::mpsc;

/// Abstraction over different channel-sender kinds, so components that fan data out
/// don't need to know if the receiver is bounded, unbounded, or a broadcast channel.
pub trait Tx<Item>: Clone + Send + Sync + 'static {
    type Error: Debug;

    /// Non-blocking send; implementors never await here (a suspended send belongs to
    /// the caller's own backpressure policy, not to this abstraction).
    fn send(&self, item: Item) -> Result<(), Self::Error>;
}

/// [`Tx`] implementation over a [`tokio::sync::mpsc::UnboundedSender`].
#[derive(Debug, Clone)]
pub struct UnboundedTx<Item>(pub mpsc::UnboundedSender<Item>);

impl<Item> Tx<Item> for UnboundedTx<Item>
where
    Item: Send + 'static,
{
    type Error = mpsc::error::SendError<Item>;

    fn send(&self, item: Item) -> Result<(), Self::Error> {
        self.0.send(item)
    }
}

/// Convenience constructor mirroring [`tokio::sync::mpsc::unbounded_channel`], returning
/// the sender wrapped in the crate-local [`UnboundedTx`] and the receiver untouched.
pub fn mpsc_unbounded<Item>() -> (UnboundedTx<Item>, mpsc::UnboundedReceiver<Item>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UnboundedTx(tx), rx)
}

/// Holds both ends of an unbounded channel together, for components (eg/ the
/// Streaming Hub's merged downstream fan-out) that construct the channel before
/// they know who the final consumer will be.
#[derive(Debug)]
pub struct Channel<Item> {
    pub tx: UnboundedTx<Item>,
    pub rx: mpsc::UnboundedReceiver<Item>,
}

impl<Item> Default for Channel<Item> {
    fn default() -> Self {
        let (tx, rx) = mpsc_unbounded();
        Self { tx, rx }
    }
}

/// A [`Tx`] wrapper that drops sends whose receiver has gone away instead of
/// bubbling the error, logging once at `warn` level. Used at the outer edge of
/// fan-out paths where a single disconnected subscriber must never halt delivery
/// to the others.
#[derive(Debug, Clone)]
pub struct ChannelTxDroppable<T> {
    inner: T,
}

impl<T> ChannelTxDroppable<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<Item, T> ChannelTxDroppable<T>
where
    T: Tx<Item>,
{
    pub fn send(&self, item: Item) {
        if self.inner.send(item).is_err() {
            tracing::warn!("dropping send: receiver has disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_channel_delivers_in_order() {
        let (tx, mut rx) = mpsc_unbounded::<u32>();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn droppable_tx_swallows_send_after_receiver_dropped() {
        let (tx, rx) = mpsc_unbounded::<u32>();
        drop(rx);
        let droppable = ChannelTxDroppable::new(tx);
        droppable.send(1); // must not panic
    }
}
