//! Channel-multiplexed output buffer
//!
//! Everything the game prints lands in the current channel (`MAIN` unless the
//! game selects another). The buffer is flushed as one [`ChannelOutput`] batch
//! whenever the engine asks the host for input and when the game ends.

use super::constants::DEFAULT_CHANNEL;
use rustc_hash::FxHashMap;

/// Channel name to accumulated text
pub type ChannelOutput = FxHashMap<String, String>;

#[derive(Debug, Clone)]
pub struct OutputBuffer {
    channels: ChannelOutput,
    current: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        OutputBuffer {
            channels: ChannelOutput::default(),
            current: DEFAULT_CHANNEL.to_string(),
        }
    }

    pub fn current_channel(&self) -> &str {
        &self.current
    }

    pub fn set_channel(&mut self, name: String) {
        self.current = name;
    }

    pub fn write_char(&mut self, ch: char) {
        self.channels
            .entry(self.current.clone())
            .or_default()
            .push(ch);
    }

    pub fn write_str(&mut self, text: &str) {
        self.channels
            .entry(self.current.clone())
            .or_default()
            .push_str(text);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(String::is_empty)
    }

    /// Take everything written since the last flush
    pub fn flush(&mut self) -> ChannelOutput {
        std::mem::take(&mut self.channels)
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Append each channel of `batch` onto `into`
pub fn merge_output(into: &mut ChannelOutput, batch: ChannelOutput) {
    for (channel, text) in batch {
        into.entry(channel).or_default().push_str(&text);
    }
}
