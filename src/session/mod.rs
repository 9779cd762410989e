//! Session state shared between HTTP handlers and the loop runner
//!
//! - `state` - the single mutable session record
//! - `ledger` - process-lifetime audit ledger of API exchanges
//! - `callbacks` - the sink the sampling loop reports into

pub mod callbacks;
pub mod ledger;
pub mod state;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use ledger::{AuditLedger, LedgerEntry};
pub use state::{Phase, Session, SessionError, SessionSnapshot};

/// Session plus audit ledger behind short-lived locks
///
/// Neither lock is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct SharedSession {
    session: Mutex<Session>,
    ledger: Mutex<AuditLedger>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            ledger: Mutex::new(AuditLedger::new()),
        }
    }

    /// Lock the session record
    ///
    /// A panic while the lock was held leaves the data usable, so poisoning
    /// is ignored.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ledger(&self) -> MutexGuard<'_, AuditLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ledger_snapshot(&self) -> BTreeMap<String, LedgerEntry> {
        self.ledger().snapshot()
    }
}
