//! Job type to processor dispatch

use std::collections::HashMap;
use std::sync::Arc;

use domain_claims::ClaimGateway;

use crate::error::JobError;
use crate::event::PatientEventType;
use crate::ledger::JobLedger;
use crate::payload::JobPayload;
use crate::processor::{PatientEventProcessor, ProcessingResult, TransitionRule};

/// Routes each payload to the processor for its job type
#[derive(Clone)]
pub struct Dispatcher {
    processors: HashMap<PatientEventType, PatientEventProcessor>,
}

impl Dispatcher {
    /// Registers the admission, discharge and treatment-initiated processors
    pub fn standard(ledger: Arc<dyn JobLedger>, claims: ClaimGateway) -> Self {
        let processors = PatientEventType::ALL
            .into_iter()
            .map(|event_type| {
                let rule = TransitionRule::for_event(event_type);
                (
                    event_type,
                    PatientEventProcessor::new(rule, Arc::clone(&ledger), claims.clone()),
                )
            })
            .collect();
        Self { processors }
    }

    pub async fn dispatch(&self, payload: &JobPayload) -> Result<ProcessingResult, JobError> {
        let processor = self.processors.get(&payload.job_type).ok_or_else(|| {
            JobError::InvalidPayload(format!("no processor registered for {}", payload.job_type))
        })?;
        processor.process(payload).await
    }
}
