//! per-node busy flag
use std::sync::atomic::{AtomicU8, Ordering};

/// Transfer state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Idle,
    Downloading,
    Uploading,
}

impl Transfer {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Transfer::Downloading,
            2 => Transfer::Uploading,
            _ => Transfer::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Transfer::Idle => 0,
            Transfer::Downloading => 1,
            Transfer::Uploading => 2,
        }
    }
}

/// Result of a download or upload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    /// another transfer was in flight on the same node
    Rejected,
    Failed,
}

/// At most one transfer at a time
///
/// A second transfer is rejected, never queued.
#[derive(Debug, Default)]
pub struct Busy {
    state: AtomicU8,
}

impl Busy {
    pub fn current(&self) -> Transfer {
        Transfer::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Marks the node busy until the returned token is dropped
    ///
    /// Returns `None` (and logs) if a transfer is already in flight.
    pub fn begin(&self, transfer: Transfer, node: &str) -> Option<BusyToken<'_>> {
        debug_assert_ne!(transfer, Transfer::Idle);
        match self.state.compare_exchange(
            Transfer::Idle.as_u8(),
            transfer.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Some(BusyToken { busy: self }),
            Err(current) => {
                tracing::error!(
                    node,
                    requested = ?transfer,
                    in_flight = ?Transfer::from_u8(current),
                    "transfer rejected, node is busy"
                );
                None
            }
        }
    }
}

/// Clears the busy flag on drop
#[derive(Debug)]
pub struct BusyToken<'a> {
    busy: &'a Busy,
}

impl Drop for BusyToken<'_> {
    fn drop(&mut self) {
        self.busy
            .state
            .store(Transfer::Idle.as_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_transfer_rejected() {
        let busy = Busy::default();
        let token = busy.begin(Transfer::Downloading, "a.hcl");
        assert!(token.is_some());
        assert_eq!(busy.current(), Transfer::Downloading);

        assert!(busy.begin(Transfer::Uploading, "a.hcl").is_none());
        assert!(busy.begin(Transfer::Downloading, "a.hcl").is_none());
        assert_eq!(busy.current(), Transfer::Downloading);

        drop(token);
        assert_eq!(busy.current(), Transfer::Idle);
        assert!(busy.begin(Transfer::Uploading, "a.hcl").is_some());
    }
}
