//! Processing queue: the ordered list of uploaded documents and the single
//! worker that extracts them one at a time.
//!
//! ## State machine
//!
//! ```text
//! pending ──▶ processing ──▶ completed ──▶ exported
//!                  │              │
//!                  └──▶ error ◀───┘ (export failure)
//! ```
//!
//! `exported` and `error` are terminal. Nothing re-enters `pending`; a
//! failed item is retried by removing it and enqueueing the file again.
//!
//! ## Worker
//!
//! [`ProcessingQueue::enqueue`] sends each new item id down an unbounded
//! channel. One spawned task drains the channel in order and awaits each
//! extraction before taking the next id, so at most one item is ever
//! `processing`. Ids of items removed while still queued are skipped.
//!
//! Queue state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`; a `watch` channel announces every change for
//! [`ProcessingQueue::wait_idle`].

use crate::config::FortnoxCredentials;
use crate::error::Pdf2PoError;
use crate::extract::OrderExtractor;
use crate::fortnox::{OrderSubmitter, SubmitResponse};
use crate::model::{ExtractedData, PurchaseOrder};
use crate::pipeline::input::PdfDocument;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prefix that marks an error as coming from export rather than extraction.
pub const EXPORT_FAILURE_PREFIX: &str = "Export failed: ";

/// Lifecycle status of a [`QueueItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Exported,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Error => "error",
            QueueStatus::Exported => "exported",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded document tracked through the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    #[serde(skip)]
    pub file: PdfDocument,
    pub file_name: String,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    fn new(file: PdfDocument) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file.file_name.clone(),
            file,
            status: QueueStatus::Pending,
            extracted_data: None,
            error: None,
            added_at: Utc::now(),
            processed_at: None,
            exported_at: None,
        }
    }
}

/// Items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub exported: usize,
}

/// Outcome of [`ProcessingQueue::export_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl ExportSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueueItem>,
    selected: Option<String>,
}

impl QueueState {
    fn find(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn is_idle(&self) -> bool {
        !self
            .items
            .iter()
            .any(|i| matches!(i.status, QueueStatus::Pending | QueueStatus::Processing))
    }

    /// The item, provided it is `completed` with data.
    fn completed(&self, id: &str) -> Result<&QueueItem, Pdf2PoError> {
        let item = self.find(id).ok_or_else(|| Pdf2PoError::ItemNotFound { id: id.to_string() })?;
        if item.status != QueueStatus::Completed || item.extracted_data.is_none() {
            return Err(Pdf2PoError::InvalidTransition {
                id: id.to_string(),
                status: item.status.to_string(),
                expected: "completed",
            });
        }
        Ok(item)
    }
}

struct Shared {
    state: Mutex<QueueState>,
    changed: watch::Sender<u64>,
    progress: ProgressCallback,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.send_modify(|rev| *rev += 1);
    }

    /// `pending → processing`; returns the document to extract.
    fn begin(&self, id: &str) -> Option<PdfDocument> {
        let doc = {
            let mut state = self.lock();
            let item = state
                .find_mut(id)
                .filter(|i| i.status == QueueStatus::Pending)?;
            item.status = QueueStatus::Processing;
            item.file.clone()
        };
        self.notify();
        Some(doc)
    }

    /// `processing → completed | error`.
    fn finish(&self, id: &str, file_name: &str, result: Result<ExtractedData, Pdf2PoError>) {
        let outcome = {
            let mut state = self.lock();
            match state.find_mut(id) {
                None => {
                    debug!(%id, "Item removed during extraction; dropping result");
                    None
                }
                Some(item) => match result {
                    Ok(data) => {
                        let confidence = data.confidence;
                        item.status = QueueStatus::Completed;
                        item.extracted_data = Some(data);
                        item.processed_at = Some(Utc::now());
                        Some(Ok(confidence))
                    }
                    Err(e) => {
                        let message = e.to_string();
                        item.status = QueueStatus::Error;
                        item.error = Some(message.clone());
                        Some(Err(message))
                    }
                },
            }
        };

        match outcome {
            Some(Ok(confidence)) => self.progress.on_item_complete(id, file_name, confidence),
            Some(Err(message)) => self.progress.on_item_error(id, file_name, &message),
            None => {}
        }
        self.notify();
    }

    /// `completed → exported`.
    /// The current, normalised order of a `completed` item.
    fn completed_order(&self, id: &str) -> Result<PurchaseOrder, Pdf2PoError> {
        let state = self.lock();
        let item = state.completed(id)?;
        item.extracted_data
            .as_ref()
            .map(|d| d.purchase_order.normalized())
            .ok_or_else(|| Pdf2PoError::Internal(format!("item {id} has no data")))
    }

    fn mark_exported(&self, id: &str) {
        {
            let mut state = self.lock();
            if let Some(item) = state
                .find_mut(id)
                .filter(|i| i.status == QueueStatus::Completed)
            {
                item.status = QueueStatus::Exported;
                item.exported_at = Some(Utc::now());
            }
            if state.selected.as_deref() == Some(id) {
                state.selected = None;
            }
        }
        self.notify();
    }

    /// `completed → error` after a failed export.
    fn mark_export_failed(&self, id: &str, message: String) {
        {
            let mut state = self.lock();
            if let Some(item) = state
                .find_mut(id)
                .filter(|i| i.status == QueueStatus::Completed)
            {
                item.status = QueueStatus::Error;
                item.error = Some(message);
            }
        }
        self.notify();
    }
}

/// Handle to the queue. Cheap to clone; the worker stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct ProcessingQueue {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<String>,
}

impl ProcessingQueue {
    /// Create the queue and spawn its worker.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn new(extractor: Arc<dyn OrderExtractor>) -> Self {
        Self::with_progress(extractor, Arc::new(NoopProgressCallback))
    }

    pub fn with_progress(extractor: Arc<dyn OrderExtractor>, progress: ProgressCallback) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (changed, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            changed,
            progress,
        });
        tokio::spawn(run_worker(Arc::clone(&shared), extractor, rx));
        Self { shared, jobs }
    }

    /// Append one `pending` item per document, in order. No de-duplication.
    pub fn enqueue(&self, docs: impl IntoIterator<Item = PdfDocument>) -> Vec<String> {
        let items: Vec<QueueItem> = docs.into_iter().map(QueueItem::new).collect();
        let added: Vec<(String, String)> = items
            .iter()
            .map(|i| (i.id.clone(), i.file_name.clone()))
            .collect();

        self.shared.lock().items.extend(items);

        for (id, file_name) in &added {
            debug!(%id, %file_name, "Queued");
            self.shared.progress.on_item_queued(id, file_name);
            if self.jobs.send(id.clone()).is_err() {
                error!(%id, "Queue worker has stopped; item stays pending");
            }
        }
        self.shared.notify();
        added.into_iter().map(|(id, _)| id).collect()
    }

    /// Delete an item regardless of status. Clears the review selection
    /// when it pointed at the item.
    pub fn remove(&self, id: &str) -> Result<QueueItem, Pdf2PoError> {
        let removed = {
            let mut state = self.shared.lock();
            let pos = state
                .items
                .iter()
                .position(|i| i.id == id)
                .ok_or_else(|| Pdf2PoError::ItemNotFound { id: id.to_string() })?;
            if state.selected.as_deref() == Some(id) {
                state.selected = None;
            }
            state.items.remove(pos)
        };
        self.shared.notify();
        Ok(removed)
    }

    /// Snapshot of every item in queue order.
    pub fn items(&self) -> Vec<QueueItem> {
        self.shared.lock().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.shared.lock().find(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.shared.lock();
        state
            .items
            .iter()
            .fold(QueueCounts::default(), |mut c, item| {
                match item.status {
                    QueueStatus::Pending => c.pending += 1,
                    QueueStatus::Processing => c.processing += 1,
                    QueueStatus::Completed => c.completed += 1,
                    QueueStatus::Error => c.error += 1,
                    QueueStatus::Exported => c.exported += 1,
                }
                c
            })
    }

    /// Pick a `completed` item for review.
    pub fn select(&self, id: &str) -> Result<QueueItem, Pdf2PoError> {
        let item = {
            let mut state = self.shared.lock();
            let item = state.completed(id)?.clone();
            state.selected = Some(id.to_string());
            item
        };
        self.shared.notify();
        Ok(item)
    }

    pub fn selected(&self) -> Option<QueueItem> {
        let state = self.shared.lock();
        state.selected.as_deref().and_then(|id| state.find(id)).cloned()
    }

    pub fn clear_selection(&self) {
        self.shared.lock().selected = None;
        self.shared.notify();
    }

    /// Replace a completed item's purchase order wholesale.
    pub fn update_order(&self, id: &str, order: PurchaseOrder) -> Result<(), Pdf2PoError> {
        {
            let mut state = self.shared.lock();
            state.completed(id)?;
            if let Some(data) = state
                .find_mut(id)
                .and_then(|i| i.extracted_data.as_mut())
            {
                data.purchase_order = order;
            }
        }
        self.shared.notify();
        Ok(())
    }

    /// Submit one reviewed item.
    ///
    /// On success the item becomes `exported`. On failure the error is
    /// returned and the item stays `completed` so it can be resubmitted.
    pub async fn submit(
        &self,
        id: &str,
        submitter: &dyn OrderSubmitter,
        credentials: Option<FortnoxCredentials>,
    ) -> Result<SubmitResponse, Pdf2PoError> {
        let order = self.normalized_order(id)?;
        let response = submitter.submit_order(&order, credentials).await?;
        self.shared.mark_exported(id);
        info!(%id, "Purchase order submitted");
        Ok(response)
    }

    /// Submit every `completed` item, one at a time in queue order.
    ///
    /// Each item is re-read just before its submission: items removed or no
    /// longer `completed` are skipped and edits made meanwhile are sent.
    /// Accepted items become `exported`; rejected ones become `error` with
    /// an [`EXPORT_FAILURE_PREFIX`] message. With nothing to export this
    /// returns an empty summary without contacting the gateway.
    pub async fn export_all(
        &self,
        submitter: &dyn OrderSubmitter,
        credentials: Option<FortnoxCredentials>,
    ) -> ExportSummary {
        let batch: Vec<String> = {
            let state = self.shared.lock();
            state
                .items
                .iter()
                .filter(|i| i.status == QueueStatus::Completed && i.extracted_data.is_some())
                .map(|i| i.id.clone())
                .collect()
        };

        if batch.is_empty() {
            info!("No completed orders to export");
            return ExportSummary::default();
        }
        info!("Exporting {} purchase orders", batch.len());

        let credentials = &credentials;
        let shared = &self.shared;
        let summary = stream::iter(batch)
            .fold(ExportSummary::default(), move |mut acc, id| async move {
                // Items removed or edited while earlier submissions ran.
                let Ok(order) = shared.completed_order(&id) else {
                    debug!(%id, "Skipping item that is no longer completed");
                    return acc;
                };
                match submitter.submit_order(&order, credentials.clone()).await {
                    Ok(_) => {
                        shared.mark_exported(&id);
                        acc.succeeded += 1;
                    }
                    Err(e) => {
                        warn!(%id, error = %e, "Export failed");
                        shared.mark_export_failed(&id, format!("{EXPORT_FAILURE_PREFIX}{e}"));
                        acc.failed += 1;
                    }
                }
                acc
            })
            .await;

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Export finished"
        );
        self.shared
            .progress
            .on_export_complete(summary.succeeded, summary.failed);
        summary
    }

    /// True when nothing is `pending` or `processing`.
    pub fn is_idle(&self) -> bool {
        self.shared.lock().is_idle()
    }

    /// Wait until the worker has nothing left to do.
    pub async fn wait_idle(&self) {
        let mut changes = self.shared.changed.subscribe();
        loop {
            if self.is_idle() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    fn normalized_order(&self, id: &str) -> Result<PurchaseOrder, Pdf2PoError> {
        self.shared.completed_order(id)
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    extractor: Arc<dyn OrderExtractor>,
    mut jobs: mpsc::UnboundedReceiver<String>,
) {
    while let Some(id) = jobs.recv().await {
        let Some(doc) = shared.begin(&id) else {
            debug!(%id, "Skipping item that is no longer pending");
            continue;
        };
        info!(%id, file = %doc.file_name, "Processing");
        shared.progress.on_item_start(&id, &doc.file_name);

        let result = extractor.extract(&doc).await;
        shared.finish(&id, &doc.file_name, result);
    }
    debug!("Queue worker stopped");
}
