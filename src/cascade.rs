//! Ordered, non-atomic multi-step mutations.
//!
//! Steps run in sequence against the store with no enclosing transaction.
//! When a step fails after earlier steps committed, the error is reported as
//! a partial failure carrying the committed step names so an operator can
//! reconcile by hand. Nothing is rolled back or retried.

use serde_json::json;

use crate::error::{ErrorKind, ServiceError, ServiceResult};

#[derive(Debug)]
pub struct Cascade {
    label: &'static str,
    completed: Vec<&'static str>,
}

impl Cascade {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            completed: Vec::new(),
        }
    }

    pub fn step<T>(
        &mut self,
        name: &'static str,
        run: impl FnOnce() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        match run() {
            Ok(v) => {
                tracing::debug!(cascade = self.label, step = name, "cascade step done");
                self.completed.push(name);
                Ok(v)
            }
            Err(e) if self.completed.is_empty() => Err(e),
            Err(e) => {
                tracing::error!(
                    cascade = self.label,
                    step = name,
                    completed = ?self.completed,
                    error = %e,
                    "cascade stopped after partial commit; manual reconciliation required"
                );
                Err(ServiceError::new(
                    ErrorKind::StoreFailure,
                    format!("{} partially applied: step {} failed: {}", self.label, name, e.message),
                )
                .with_details(json!({
                    "cascade": self.label,
                    "completedSteps": self.completed,
                    "failedStep": name,
                    "cause": e.kind.code(),
                })))
            }
        }
    }

    pub fn finish(self) -> Vec<&'static str> {
        tracing::info!(cascade = self.label, steps = ?self.completed, "cascade complete");
        self.completed
    }
}
