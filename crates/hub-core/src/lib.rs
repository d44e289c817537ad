//! Domain model (§3) shared by the hub's components, plus the retry policy
//! (C8) used as a decorator around C1/C3/C6 operations.

pub mod command;
pub mod dead_letter;
pub mod dedup_entry;
pub mod device;
pub mod event;
pub mod retry;
pub mod schedule;

pub use command::{Command, CommandStatus};
pub use dead_letter::{DeadLetterRecord, FailureReason};
pub use dedup_entry::{DedupEntry, DedupState};
pub use device::{Device, Heartbeat, ModuleStatus};
pub use event::Event;
pub use retry::{RetryError, RetryPolicy};
pub use schedule::{Schedule, ScheduleCommand, ScheduleError, ScheduleType};
