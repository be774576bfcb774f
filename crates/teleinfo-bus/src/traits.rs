use std::sync::Arc;

use crate::error::Result;

/// Something that can publish a payload on a topic.
///
/// Delivery is fire-and-forget: `Ok(())` means the message was handed to the
/// transport, not that anyone received it.
pub trait Publish: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

impl<P: Publish + ?Sized> Publish for Arc<P> {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        (**self).publish(topic, payload)
    }
}

impl<P: Publish + ?Sized> Publish for &P {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        (**self).publish(topic, payload)
    }
}

impl<P: Publish + ?Sized> Publish for Box<P> {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        (**self).publish(topic, payload)
    }
}
