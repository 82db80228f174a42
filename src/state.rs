use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::certificate::{ArtifactCache, CertificateService, NumberGenerator, RenderQueue, Renderer};
use crate::config::Config;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub certificates: Arc<CertificateService>,
    pub media_root: PathBuf,
    pub media_url: String,
}

impl AppState {
    /// Wire the certificate pipeline on top of `store`. Spawns the render
    /// worker, so this must run inside the tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let renderer = Arc::new(Renderer::new(config.assets.clone()));
        let queue = RenderQueue::spawn(renderer, config.render_queue_capacity);
        let cache = ArtifactCache::new(&config.media_root, &config.media_url);
        let numbers = NumberGenerator::new(&config.cert_number_prefix);
        info!(
            media_root = %config.media_root.display(),
            template = %config.assets.template.display(),
            font = %config.assets.font.display(),
            "certificate pipeline ready"
        );

        Self {
            certificates: Arc::new(CertificateService::new(
                store.clone(),
                cache,
                queue,
                numbers,
            )),
            store,
            media_root: config.media_root.clone(),
            media_url: config.media_url.clone(),
        }
    }
}
