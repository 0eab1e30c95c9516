//! Publishes acknowledgments back to the producer.

use shotlink_transport::{AckMessage, Publisher};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Acknowledger {
    publisher: Publisher,
    ack_topic: String,
}

impl Acknowledger {
    pub fn new(publisher: Publisher, ack_topic: impl Into<String>) -> Self {
        Self {
            publisher,
            ack_topic: ack_topic.into(),
        }
    }

    /// Publish `{"_id": id, "ack": "received"}`. Returns whether the ack went
    /// out; a dropped ack is logged and the producer will resend later.
    pub async fn acknowledge(&self, id: &str) -> bool {
        let payload = match AckMessage::received(id).to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(record_id = %id, error = %e, "Failed to encode acknowledgment");
                return false;
            }
        };

        match self.publisher.publish(&self.ack_topic, &payload).await {
            Ok(()) => {
                debug!(record_id = %id, "Acknowledged");
                true
            }
            Err(e) => {
                warn!(record_id = %id, error = %e, "Acknowledgment dropped");
                false
            }
        }
    }
}
