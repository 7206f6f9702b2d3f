use crate::error::StreamFault;

/// Receiver side of a [`super::Stream`].
///
/// A stream delivers zero or more `on_next` calls followed by at most one terminal event
/// (`on_error` or `on_complete`, never both). Calls are synchronous: the whole downstream graph
/// reacts to a value before `on_next` returns.
pub trait Subscriber<T> {
    fn on_next(&mut self, value: &T);

    fn on_error(&mut self, fault: &StreamFault);

    fn on_complete(&mut self);
}

/// Adapts a closure into a [`Subscriber`] that ignores terminal events.
pub struct FnSubscriber<F>(pub F);

impl<T, F> Subscriber<T> for FnSubscriber<F>
where
    F: FnMut(&T),
{
    fn on_next(&mut self, value: &T) {
        (self.0)(value)
    }

    fn on_error(&mut self, _fault: &StreamFault) {}

    fn on_complete(&mut self) {}
}
