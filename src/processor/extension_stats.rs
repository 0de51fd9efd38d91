//! Accumulate-then-drain buffer for extension measurements.

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use tracing::trace;

use crate::protocol::{ExtensionRecord, ExtensionStatsPayload};

// ============================================================================
// ExtensionStats
// ============================================================================

/// Buffered extension records, in insertion order.
#[derive(Debug, Default)]
pub struct ExtensionStats {
    records: Vec<ExtensionRecord>,
}

impl ExtensionStats {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes and appends `stats`.
    ///
    /// Empty or unserializable payloads are dropped. Returns `true` if the
    /// record was kept.
    pub fn add(&mut self, stats: ExtensionStatsPayload) -> bool {
        match ExtensionRecord::normalize(stats) {
            Ok(Some(record)) => {
                self.records.push(record);
                true
            }
            Ok(None) => {
                trace!("Empty extension stats dropped");
                false
            }
            Err(e) => {
                trace!(error = %e, "Unserializable extension stats dropped");
                false
            }
        }
    }

    /// Returns `true` if anything is buffered.
    #[inline]
    #[must_use]
    pub fn has_record(&self) -> bool {
        !self.records.is_empty()
    }

    /// Returns the number of buffered records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Takes every buffered record and leaves the buffer empty.
    #[inline]
    pub fn pick(&mut self) -> Vec<ExtensionRecord> {
        mem::take(&mut self.records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_pick_drains_in_order() {
        let mut buffer = ExtensionStats::new();
        buffer.add(ExtensionStatsPayload::new(Some("a"), Some(json!(1))));
        buffer.add(ExtensionStatsPayload::new(Some("b"), Some(json!(2))));
        assert!(buffer.has_record());

        let picked = buffer.pick();
        let types: Vec<_> = picked
            .iter()
            .map(|r| r.extension_type.as_deref().unwrap())
            .collect();
        assert_eq!(types, vec!["a", "b"]);

        assert!(!buffer.has_record());
        assert!(buffer.pick().is_empty());
    }

    #[test]
    fn test_empty_payload_never_picked() {
        let mut buffer = ExtensionStats::new();
        assert!(!buffer.add(ExtensionStatsPayload::new(None, None)));
        assert!(buffer.pick().is_empty());
    }

    #[test]
    fn test_records_after_pick_go_to_next_pick() {
        let mut buffer = ExtensionStats::new();
        buffer.add(ExtensionStatsPayload::new(Some("first"), None));
        let first = buffer.pick();
        buffer.add(ExtensionStatsPayload::new(Some("second"), None));

        assert_eq!(first.len(), 1);
        let second = buffer.pick();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].extension_type.as_deref(), Some("second"));
    }

    proptest! {
        #[test]
        fn prop_pick_returns_exactly_the_valid_records(
            entries in prop::collection::vec(
                (prop::option::of("[a-z]{0,4}"), prop::option::of(0i64..5)),
                0..40,
            )
        ) {
            let mut buffer = ExtensionStats::new();
            let mut expected = Vec::new();
            for (kind, value) in entries {
                let payload = ExtensionStatsPayload::new(kind.as_deref(), value.map(|v| json!(v)));
                if !payload.is_empty() {
                    expected.push(payload.clone());
                }
                buffer.add(payload);
            }

            let picked = buffer.pick();
            prop_assert_eq!(picked.len(), expected.len());
            for (record, payload) in picked.iter().zip(&expected) {
                prop_assert_eq!(&record.extension_type, &payload.extension_type);
            }
            prop_assert!(buffer.pick().is_empty());
        }
    }
}
