//! Render queue.
//!
//! Requests submit a job and await a completion notification instead of
//! rendering inline. One worker drains the queue and runs each render on the
//! blocking pool. Before rendering it re-checks the target path, so jobs for
//! the same artifact queued by overlapping requests render only once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::{CertificateError, CertificateFields, Renderer};

struct RenderJob {
    fields: CertificateFields,
    output: PathBuf,
    done: oneshot::Sender<Result<(), CertificateError>>,
}

#[derive(Clone)]
pub struct RenderQueue {
    tx: mpsc::Sender<RenderJob>,
}

impl RenderQueue {
    /// Start the worker; must be called from within a tokio runtime.
    pub fn spawn(renderer: Arc<Renderer>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RenderJob>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let RenderJob {
                    fields,
                    output,
                    done,
                } = job;
                let result = run(renderer.clone(), fields, output).await;
                // the submitter may have gone away; the file is still published
                let _ = done.send(result);
            }
            debug!("render queue drained, worker exiting");
        });
        Self { tx }
    }

    /// Queue a render of `fields` to `output` and wait for it to finish.
    pub async fn render(
        &self,
        fields: CertificateFields,
        output: PathBuf,
    ) -> Result<(), CertificateError> {
        let (done, finished) = oneshot::channel();
        self.tx
            .send(RenderJob {
                fields,
                output,
                done,
            })
            .await
            .map_err(|_| CertificateError::QueueClosed)?;
        finished.await.map_err(|_| CertificateError::QueueClosed)?
    }
}

async fn run(
    renderer: Arc<Renderer>,
    fields: CertificateFields,
    output: PathBuf,
) -> Result<(), CertificateError> {
    if tokio::fs::try_exists(&output).await.unwrap_or(false) {
        debug!(path = %output.display(), "artifact already rendered, skipping");
        return Ok(());
    }

    let started = Instant::now();
    let number = fields.certification_number.clone();
    let path = output.clone();
    let result = tokio::task::spawn_blocking(move || renderer.render_to(&fields, &output))
        .await
        .map_err(|e| CertificateError::RenderFailure(format!("render task failed: {e}")))?;

    match &result {
        Ok(()) => info!(
            certification_number = %number,
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "certificate rendered"
        ),
        Err(e) => error!(certification_number = %number, error = %e, "certificate render failed"),
    }
    result
}
