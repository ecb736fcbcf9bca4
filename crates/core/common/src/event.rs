/// A change notification received on a subscribed channel.
///
/// The payload is the raw text sent by the trigger. It is expected to be a JSON object keyed by
/// the channel's notification fields, but nothing verifies that before a handler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    /// The channel the notification arrived on
    pub channel: String,
    /// The notification payload as UTF-8 text
    pub payload: String,
    /// Backend process ID of the notifying session
    pub process_id: u32,
}

impl ChannelEvent {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>, process_id: u32) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            process_id,
        }
    }

    /// Parses the payload as an untyped JSON value
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Deserializes the payload into a typed row
    pub fn decode<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_str(&self.payload)
    }
}
