//! Delivery state machine for outbound messages.
//!
//! Pure transition logic over [`DeliveryStatus`]. The ladder
//! `Sent → Delivered → Read` is monotonically non-decreasing, and
//! `Failed` is terminal and reachable only from `Sent`. Duplicate and
//! out-of-order receipts collapse to no-ops, which substitutes for
//! ordering enforcement on the relay stream.

use parley_proto::message::DeliveryStatus;

/// Computes the result of a transition request against the ladder.
///
/// Returns `Some(new_status)` for a genuine forward step and `None`
/// for everything else: requests targeting a state at or below the
/// current one (duplicate or stale receipts), requests out of a
/// terminal state, and `Failed` requested from anything but `Sent`.
///
/// A `Read` receipt arriving before the `Delivered` acknowledgment is
/// accepted as a direct `Sent → Read` jump; the late acknowledgment
/// then lands as a no-op.
///
/// Transitions never report errors: correctness must survive duplicate
/// and stale relay events, so callers simply skip `None`.
#[must_use]
pub const fn advance(current: DeliveryStatus, target: DeliveryStatus) -> Option<DeliveryStatus> {
    use DeliveryStatus::{Delivered, Failed, Read, Sent};
    match (current, target) {
        (Sent, Delivered) => Some(Delivered),
        (Sent | Delivered, Read) => Some(Read),
        (Sent, Failed) => Some(Failed),
        _ => None,
    }
}
