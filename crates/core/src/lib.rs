//! Pure boot logic shared by the bootstrapper binary: polling, ledger
//! classification, step planning and fixture inspection.

pub mod ledger;
pub mod plan;
pub mod poll;
pub mod snapshot;

pub use ledger::{classify, summarize, InitState, LedgerEntry, LedgerSummary};
pub use plan::{BootPlan, BootStep};
pub use poll::{poll_until_ready, CancelSignal, Canceller, PollError, PollEvent, PollPolicy};
pub use snapshot::{inspect, SnapshotError, SnapshotSummary};
