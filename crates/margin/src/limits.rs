//! Pacing and size limits for thought streams and generator output

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and pacing applied to a single thought stream session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLimits {
    /// Number of generate/parse/emit iterations before the stream completes
    pub max_iterations: u32,
    /// Pause after each emitted thought
    #[serde(with = "duration_ms")]
    pub thought_delay: Duration,
    /// Pause after each full batch, before the next iteration
    #[serde(with = "duration_ms")]
    pub iteration_delay: Duration,
    /// How many of the most recent history entries feed the next prompt
    pub history_window: usize,
    /// Capacity of the outbound event channel
    pub channel_capacity: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            thought_delay: Duration::from_millis(500),
            iteration_delay: Duration::from_millis(2000),
            history_window: 3,
            channel_capacity: 16,
        }
    }
}

impl StreamLimits {
    /// Limits with both pauses removed. Mostly useful in tests.
    pub fn unpaced() -> Self {
        Self {
            thought_delay: Duration::ZERO,
            iteration_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Helper for serializing Duration as milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Buffer that captures process output up to a fixed limit.
///
/// Unlike a truncating buffer, exceeding the limit is an error for the
/// generator, so the buffer only records that it overflowed and stops
/// accepting data.
#[derive(Debug, Clone)]
pub(crate) struct CaptureBuffer {
    buffer: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl CaptureBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Append data. Returns `false` once the limit has been exceeded.
    pub(crate) fn push(&mut self, data: &[u8]) -> bool {
        if self.overflowed {
            return false;
        }

        let remaining = self.limit.saturating_sub(self.buffer.len());
        if data.len() > remaining {
            self.overflowed = true;
            return false;
        }

        self.buffer.extend_from_slice(data);
        true
    }

    /// Whether any push has exceeded the limit.
    pub(crate) fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub(crate) fn into_string(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== StreamLimits Tests ====================

    #[test]
    fn test_default_limits() {
        let limits = StreamLimits::default();

        assert_eq!(limits.max_iterations, 10);
        assert_eq!(limits.thought_delay, Duration::from_millis(500));
        assert_eq!(limits.iteration_delay, Duration::from_millis(2000));
        assert_eq!(limits.history_window, 3);
    }

    #[test]
    fn test_unpaced_keeps_iteration_cap() {
        let limits = StreamLimits::unpaced();

        assert_eq!(limits.max_iterations, 10);
        assert_eq!(limits.thought_delay, Duration::ZERO);
        assert_eq!(limits.iteration_delay, Duration::ZERO);
    }

    #[test]
    fn test_limits_serialization_format() {
        let limits = StreamLimits {
            thought_delay: Duration::from_millis(250),
            ..StreamLimits::default()
        };

        let json = serde_json::to_string(&limits).unwrap();
        assert!(json.contains("\"thought_delay\":250"));
        assert!(json.contains("\"iteration_delay\":2000"));

        let back: StreamLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }

    // ==================== CaptureBuffer Tests ====================

    #[test]
    fn test_capture_under_limit() {
        let mut buffer = CaptureBuffer::new(100);

        assert!(buffer.push(b"hello "));
        assert!(buffer.push(b"world"));
        assert!(!buffer.overflowed());
        assert_eq!(buffer.into_string(), "hello world");
    }

    #[test]
    fn test_capture_exact_boundary() {
        let mut buffer = CaptureBuffer::new(5);

        assert!(buffer.push(b"hello"));
        assert!(!buffer.overflowed());

        assert!(!buffer.push(b"!"));
        assert!(buffer.overflowed());
    }

    #[test]
    fn test_capture_rejects_after_overflow() {
        let mut buffer = CaptureBuffer::new(4);

        assert!(!buffer.push(b"too long"));
        assert!(!buffer.push(b"a"));
        assert!(buffer.overflowed());
    }

    #[test]
    fn test_capture_lossy_utf8() {
        let mut buffer = CaptureBuffer::new(16);
        buffer.push(&[b'o', b'k', 0xff]);

        assert_eq!(buffer.into_string(), "ok\u{fffd}");
    }
}
