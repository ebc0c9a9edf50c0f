//! Event sources: where raw channel-tagged payloads come from.

use async_trait::async_trait;
use neuro_triage_core::events::Channel;
use std::time::Instant;
use tokio::sync::mpsc;

/// A raw payload tagged with its channel, as received from the transport
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Which of the three multiplexed channels the payload belongs to
    pub channel: Channel,
    /// Undecoded payload bytes
    pub payload: Vec<u8>,
    /// When the envelope entered the process (for dispatch-latency metrics)
    pub enqueued_at: Instant,
}

impl EventEnvelope {
    /// Wrap a payload for a channel, stamping the arrival time
    pub fn new(channel: Channel, payload: Vec<u8>) -> Self {
        Self {
            channel,
            payload,
            enqueued_at: Instant::now(),
        }
    }
}

/// An arrival-ordered stream of envelopes
#[async_trait]
pub trait EventSource: Send {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Next envelope, or `None` when the source is exhausted
    async fn next(&mut self) -> Option<EventEnvelope>;
}

/// In-process source backed by a bounded tokio channel.
///
/// Any producer (stdin reader, file replayer, broker consumer) pushes
/// envelopes through the sender half; dropping the sender ends the stream.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<EventEnvelope>,
}

/// Create a bounded channel source, returning the producer handle and the
/// source
pub fn channel_source(capacity: usize) -> (mpsc::Sender<EventEnvelope>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource { receiver: rx })
}

#[async_trait]
impl EventSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }
}
