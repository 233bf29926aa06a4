/// Receives data fanned out from a [`crate::receiver::Receiver`].
///
/// Returning `false` from `on_receive` removes the consumer from the
/// receiver's fan-out list on the next dispatch, mirroring the owned
/// consumer list in the original receiver's poll loop.
pub trait Consumer: Send + Sync {
    fn on_receive(&self, data: &[u8], discrete: bool) -> bool;

    fn on_disconnected(&self) {}
}
