//! Transaction start options
//!
//! [`TxOptions`] is what a [`TxBeginner`](crate::TxBeginner) receives. The
//! engine passes the caller's isolation level and read-only hint through
//! unmodified; interpreting them is the driver's job.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested transaction isolation level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Whatever the driver or server uses by default
    #[default]
    Default,
    /// Read uncommitted
    ReadUncommitted,
    /// Read committed
    ReadCommitted,
    /// Write committed
    WriteCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Snapshot isolation
    Snapshot,
    /// Serializable
    Serializable,
    /// Linearizable
    Linearizable,
}

impl IsolationLevel {
    /// SQL spelling of the level, `None` for [`IsolationLevel::Default`]
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            IsolationLevel::Default => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::WriteCommitted => Some("WRITE COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Snapshot => Some("SNAPSHOT"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
            IsolationLevel::Linearizable => Some("LINEARIZABLE"),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql().unwrap_or("DEFAULT"))
    }
}

/// Options handed to a beginner when starting a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Requested isolation level
    pub isolation: IsolationLevel,
    /// Read-only hint
    pub read_only: bool,
}

impl TxOptions {
    /// Options with the given isolation level
    pub fn new(isolation: IsolationLevel, read_only: bool) -> Self {
        Self {
            isolation,
            read_only,
        }
    }
}
