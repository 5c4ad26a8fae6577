//! In-process gateway for tests. Records every intent it creates and reports
//! whatever status the test sets.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures_util::future::BoxFuture;

use crate::{CreatedIntent, IntentStatus, PaymentError, PaymentGateway, Result};

/// Arguments of one `create_intent` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedIntent {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MockGateway {
    counter: AtomicU32,
    fail: AtomicBool,
    created: Mutex<Vec<RecordedIntent>>,
    statuses: Mutex<HashMap<String, IntentStatus>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as a processor error.
    pub fn fail_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(intent_id.to_string(), status);
        }
    }

    pub fn created(&self) -> Vec<RecordedIntent> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Processor("mock failure".into()));
        }
        Ok(())
    }
}

impl PaymentGateway for MockGateway {
    fn create_intent<'a>(
        &'a self,
        amount_minor: i64,
        currency: &'a str,
        metadata: HashMap<String, String>,
    ) -> BoxFuture<'a, Result<CreatedIntent>> {
        Box::pin(async move {
            self.check()?;
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("pi_mock_{n}");
            if let Ok(mut created) = self.created.lock() {
                created.push(RecordedIntent {
                    id: id.clone(),
                    amount_minor,
                    currency: currency.to_string(),
                    metadata,
                });
            }
            Ok(CreatedIntent { client_secret: format!("{id}_secret"), id })
        })
    }

    fn intent_status<'a>(&'a self, intent_id: &'a str) -> BoxFuture<'a, Result<IntentStatus>> {
        Box::pin(async move {
            self.check()?;
            let statuses = self
                .statuses
                .lock()
                .map_err(|_| PaymentError::Processor("mock state poisoned".into()))?;
            Ok(statuses.get(intent_id).copied().unwrap_or(IntentStatus::Incomplete))
        })
    }
}
