//! Jobs Domain
//!
//! This crate turns patient lifecycle events into claim transitions:
//!
//! ```text
//! record event -> enqueue job -> worker pool -> dispatcher -> processor
//!                                                  |
//!                     ledger (idempotency key) <---+---> claim gateway (trusted path)
//! ```
//!
//! The [`JobLedger`] is the only defense against duplicate delivery: once an
//! idempotency key is completed its stored result is returned verbatim and
//! no claim is touched again.

pub mod event;
pub mod ledger;
pub mod payload;
pub mod queue;
pub mod processor;
pub mod dispatcher;
pub mod service;
pub mod worker;
pub mod ports;
pub mod error;

pub use event::{PatientEventType, PatientStatusEvent};
pub use ledger::{JobLedger, JobProcessingLog, JobStatus};
pub use payload::{JobPayload, TriggeringActor};
pub use queue::{FailureDisposition, JobQueue, QueuedJob, RetryPolicy};
pub use processor::{PatientEventProcessor, ProcessingResult, TransitionRule};
pub use dispatcher::Dispatcher;
pub use service::{PatientEventService, RecordPatientEvent};
pub use worker::{JobOutcome, WorkerPool, WorkerSettings};
pub use ports::PatientEventStore;
pub use error::JobError;
