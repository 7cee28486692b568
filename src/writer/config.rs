//! Writer configuration.

/// Tuning knobs for [`DataWriter`](super::DataWriter).
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// `enqueue` blocks once this many writes are pending.
    pub max_queue: usize,
    /// Open stream handles are flushed periodically with this interval.
    /// Data may still sit in an OS buffer afterwards.
    pub flush_secs: u64,
    /// Extension appended to generated stream filenames.
    pub extension: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_queue: 10,
            flush_secs: 120,
            extension: ".bin".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.max_queue, 10);
        assert_eq!(config.flush_secs, 120);
        assert_eq!(config.extension, ".bin");
    }
}
