//! A scripted [DeliveryController] for tests.

use super::{DeliveryController, DiffReport, DiffRequest};
use crate::{
    errors::PromoterResult,
    forge::ForgeError,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// Answers every diff with a fixed report and records revision updates.
#[derive(Default)]
pub(crate) struct FakeDelivery {
    report: DiffReport,
    failure: Option<String>,
    diffed: Mutex<Vec<(String, bool)>>,
    revisions: Mutex<Vec<(String, String)>>,
}

impl FakeDelivery {
    pub(crate) fn with_report(report: DiffReport) -> Self {
        Self {
            report,
            ..Default::default()
        }
    }

    /// Fails every diff with a transport error carrying `message`.
    pub(crate) fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Every `(component, enabled)` pair that was diffed.
    pub(crate) fn diffed(&self) -> Vec<(String, bool)> {
        self.diffed.lock().unwrap().clone()
    }

    /// Every `(component, revision)` pair that was set.
    pub(crate) fn revisions(&self) -> Vec<(String, String)> {
        self.revisions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryController for FakeDelivery {
    async fn diff_components(&self, request: DiffRequest<'_>) -> PromoterResult<DiffReport> {
        self.diffed.lock().unwrap().extend(request.components.iter().cloned());
        match &self.failure {
            Some(message) => Err(ForgeError::Transport(message.clone()).into()),
            None => Ok(self.report.clone()),
        }
    }

    async fn set_app_revision(
        &self,
        component_path: &str,
        revision: &str,
        _repo_url: &str,
        _use_sha_label: bool,
    ) -> PromoterResult<()> {
        self.revisions
            .lock()
            .unwrap()
            .push((component_path.to_string(), revision.to_string()));
        Ok(())
    }
}
