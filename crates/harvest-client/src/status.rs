use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use harvest_core::error::AppError;
use harvest_core::report::{SessionEvent, StatusReporter};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Forwards session events to a job-tracking API.
///
/// - `POST <api>/jobs/<id>/status` on start and finish
/// - `POST <api>/jobs/<id>/progress` after every capture
/// - `POST <api>/jobs/<id>/logs` for every event
///
/// Requests are spawned and never awaited by the session; failures are
/// logged at warn level and otherwise ignored. Call [`flush`] before the
/// runtime shuts down so the final updates are not dropped.
///
/// [`flush`]: HttpStatusReporter::flush
#[derive(Clone)]
pub struct HttpStatusReporter {
    client: Client,
    job: Url,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpStatusReporter {
    pub fn new(api_base: &str, job_id: &str) -> Result<Self, AppError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(AppError::ConfigError("job id must not be empty".into()));
        }
        let base = Url::parse(&format!("{}/", api_base.trim_end_matches('/')))
            .map_err(|e| AppError::ConfigError(format!("Invalid status API URL '{api_base}': {e}")))?;
        let job = base
            .join(&format!("jobs/{job_id}/"))
            .map_err(|e| AppError::ConfigError(format!("Invalid job id '{job_id}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            job,
            pending: Arc::default(),
        })
    }

    /// Wait up to `timeout` for updates still in flight.
    pub async fn flush(&self, timeout: Duration) {
        let pending = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        let drain = async {
            for request in pending {
                let _ = request.await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(pending = count, "Gave up waiting for job updates");
        }
    }

    /// Endpoint for one of `status`, `progress` or `logs`.
    pub fn endpoint(&self, kind: &str) -> Option<Url> {
        self.job.join(kind).ok()
    }

    fn post(&self, kind: &'static str, body: Value) {
        let Some(url) = self.endpoint(kind) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(kind, "No runtime to send job update on");
            return;
        };
        let client = self.client.clone();
        let request = runtime.spawn(async move {
            let result = client
                .post(url.clone())
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(%url, error = %e, "Failed to send job {kind}");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|request| !request.is_finished());
        pending.push(request);
    }
}

impl StatusReporter for HttpStatusReporter {
    fn report(&self, event: SessionEvent<'_>) {
        for (kind, body) in payloads(&event) {
            self.post(kind, body);
        }
    }
}

/// Requests produced by one event, as (endpoint, body) pairs.
pub fn payloads(event: &SessionEvent<'_>) -> Vec<(&'static str, Value)> {
    let timestamp = Utc::now().to_rfc3339();
    let mut out = Vec::with_capacity(2);

    match event {
        SessionEvent::Started { .. } => out.push((
            "status",
            json!({
                "status": "running",
                "message": event.describe(),
                "timestamp": timestamp,
            }),
        )),
        SessionEvent::ItemCaptured {
            captured,
            requested,
            page,
            ..
        } => out.push((
            "progress",
            json!({
                "progress": {
                    "currentProduct": captured,
                    "totalProducts": requested,
                    "currentPage": page,
                    "percentage": SessionEvent::percentage(*captured, *requested),
                },
                "timestamp": timestamp,
            }),
        )),
        SessionEvent::Finished { outcome } => {
            let mut body = json!({
                "status": outcome.status.as_str(),
                "message": event.describe(),
                "timestamp": timestamp,
            });
            if let Some(cause) = &outcome.cause {
                body["error"] = Value::String(cause.clone());
            }
            out.push(("status", body));
        }
        _ => {}
    }

    out.push((
        "logs",
        json!({
            "log": event.describe(),
            "timestamp": timestamp,
        }),
    ));
    out
}
