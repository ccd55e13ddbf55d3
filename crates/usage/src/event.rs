//! Usage events and the counter delta policy.

use serde::{Deserialize, Serialize};
use wayfare_primitives::WalletAddress;

/// Bytes per billing megabyte (MiB).
pub const BYTES_PER_MEGABYTE: u64 = 1_048_576;

/// Convert bytes to megabytes rounded to two decimals.
pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    let megabytes = bytes as f64 / BYTES_PER_MEGABYTE as f64;
    (megabytes * 100.0).round() / 100.0
}

/// Change between a stored baseline and a fresh counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    /// Billable bytes since the baseline.
    pub bytes: u64,
    /// The counter went backwards (interface restart or wrap).
    ///
    /// The whole new reading is billed, which undercounts whatever was
    /// transferred between the last poll and the reset.
    pub reset: bool,
}

/// Delta between `baseline` and `total`, or `None` if nothing changed.
///
/// A reset with a zero reading still yields a delta so the baseline moves
/// down to zero.
pub fn compute_delta(baseline: u64, total: u64) -> Option<Delta> {
    match total.cmp(&baseline) {
        std::cmp::Ordering::Greater => Some(Delta {
            bytes: total - baseline,
            reset: false,
        }),
        std::cmp::Ordering::Less => Some(Delta {
            bytes: total,
            reset: true,
        }),
        std::cmp::Ordering::Equal => None,
    }
}

/// Billable usage by one client on this node. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub wallet: WalletAddress,
    pub provider_wallet: WalletAddress,
    pub region: String,
    /// `bytes` in MiB, rounded to two decimals.
    pub megabytes_used: f64,
    pub bytes: u64,
    /// Unix seconds of the poll that produced the event.
    pub observed_at: u64,
}

impl UsageEvent {
    /// Whether the event is large enough to be accepted by the backend.
    pub fn is_billable(&self) -> bool {
        self.megabytes_used > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_emits_difference() {
        assert_eq!(
            compute_delta(1000, 1500),
            Some(Delta {
                bytes: 500,
                reset: false
            })
        );
    }

    #[test]
    fn test_reset_emits_new_total() {
        assert_eq!(
            compute_delta(1500, 300),
            Some(Delta {
                bytes: 300,
                reset: true
            })
        );
        assert_eq!(compute_delta(1500, 0), Some(Delta { bytes: 0, reset: true }));
    }

    #[test]
    fn test_unchanged_emits_nothing() {
        assert_eq!(compute_delta(1500, 1500), None);
        assert_eq!(compute_delta(0, 0), None);
    }

    #[test]
    fn test_megabyte_rounding() {
        assert_eq!(bytes_to_megabytes(10 * BYTES_PER_MEGABYTE), 10.0);
        assert_eq!(bytes_to_megabytes(BYTES_PER_MEGABYTE / 2), 0.5);
        assert_eq!(bytes_to_megabytes(1_572_864), 1.5);
        assert_eq!(bytes_to_megabytes(500), 0.0);
        assert_eq!(bytes_to_megabytes(5_243), 0.01);
    }

    #[test]
    fn test_billable() {
        let event = UsageEvent {
            wallet: WalletAddress::repeat_byte(1),
            provider_wallet: WalletAddress::repeat_byte(2),
            region: "IN-West".into(),
            megabytes_used: 0.0,
            bytes: 500,
            observed_at: 0,
        };
        assert!(!event.is_billable());
        assert!(
            UsageEvent {
                megabytes_used: 0.01,
                ..event
            }
            .is_billable()
        );
    }
}
