use readmodel_core::{
    AppConfig, FeedConnector, ProjectorLoader, ReadModelError, Result, Row, Sink, SinkSlot,
};
use readmodel_feed::{Credentials, HttpConnector, PatExchange};
use readmodel_projector::{
    DylibLoader, EngineContext, ProjectorRegistry, Registration, StartStream, StreamRegistry,
    StreamSnapshot, StreamSummary,
};
use readmodel_sqlite::SqliteSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder for [`ReadModel`]
///
/// Without an explicit connector the model talks to the HTTP feed, which
/// requires credentials; building fails when none are supplied.
#[derive(Default)]
pub struct ReadModelBuilder {
    config: AppConfig,
    credentials: Credentials,
    connector: Option<Arc<dyn FeedConnector>>,
    loader: Option<Arc<dyn ProjectorLoader>>,
}

impl ReadModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Use a custom feed instead of the HTTP one.
    pub fn with_connector(mut self, connector: Arc<dyn FeedConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Resolve projector paths with a custom loader instead of shared libraries.
    pub fn with_loader(mut self, loader: Arc<dyn ProjectorLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn build(self) -> Result<ReadModel> {
        self.config.validate()?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => {
                if self.credentials.is_empty() {
                    return Err(ReadModelError::Config(
                        "a username or personal access token is required".into(),
                    ));
                }
                let tokens = PatExchange::new(
                    self.config.feed.auth_url.clone(),
                    self.credentials,
                    self.config.feed.request_timeout(),
                );
                Arc::new(HttpConnector::new(self.config.feed.clone(), Arc::new(tokens)))
            }
        };
        let loader = self.loader.unwrap_or_else(|| Arc::new(DylibLoader::new()));

        let sink = SinkSlot::new();
        let projectors = Arc::new(ProjectorRegistry::new(loader));
        let streams = StreamRegistry::new(EngineContext {
            connector,
            projectors: projectors.clone(),
            sink: sink.clone(),
            config: self.config.engine.clone(),
            page_size: self.config.feed.page_size,
        });

        Ok(ReadModel {
            config: self.config,
            sink,
            projectors,
            streams,
        })
    }
}

/// The read model service
///
/// Owns the store, the projector registry and the stream registry for the
/// lifetime of the process.
pub struct ReadModel {
    config: AppConfig,
    sink: SinkSlot,
    projectors: Arc<ProjectorRegistry>,
    streams: StreamRegistry,
}

impl ReadModel {
    pub fn builder() -> ReadModelBuilder {
        ReadModelBuilder::new()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn projectors(&self) -> &Arc<ProjectorRegistry> {
        &self.projectors
    }

    pub fn is_initialized(&self) -> bool {
        self.sink.is_initialized()
    }

    /// Open the store, in memory or at `file`, replacing any open store.
    ///
    /// Returns a description of the opened store.
    pub async fn initialize_store(&self, file: Option<&Path>) -> Result<String> {
        let mut store_config = self.config.store.clone();
        if let Some(file) = file {
            store_config = store_config.with_path(file);
        }
        let location = store_config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());

        let sink = tokio::task::spawn_blocking(move || SqliteSink::open(store_config))
            .await
            .map_err(|e| ReadModelError::Unrecoverable(format!("store open task failed: {}", e)))??;

        self.install_sink(Arc::new(sink)).await;
        Ok(format!("Database initialized at {}", location))
    }

    /// Install an already opened store, closing the one it replaces.
    pub async fn install_sink(&self, sink: Arc<dyn Sink>) {
        if let Some(previous) = self.sink.replace(sink) {
            if let Err(e) = previous.close().await {
                tracing::warn!(error = %e, "Failed to close replaced store");
            }
        }
    }

    /// Stop every stream, then close the store.
    pub async fn close_store(&self) -> Result<()> {
        if !self.sink.is_initialized() {
            return Err(ReadModelError::NotInitialized);
        }
        self.streams.shutdown().await;
        if let Some(sink) = self.sink.take() {
            sink.close().await?;
        }
        tracing::info!("Store closed");
        Ok(())
    }

    pub async fn create_table(&self, sql: &str) -> Result<()> {
        let sink = self.sink.get()?;
        sink.execute(sql).await?;
        tracing::debug!(sql, "Table created");
        Ok(())
    }

    /// Load projector code from `path` and register it under `name`.
    pub async fn register_projector(&self, name: &str, path: &Path) -> Result<Registration> {
        let projectors = self.projectors.clone();
        let name = name.to_string();
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || projectors.register(&name, &path))
            .await
            .map_err(|e| ReadModelError::Load(format!("projector load task failed: {}", e)))?
    }

    pub fn start_stream(&self, request: StartStream) -> Result<StreamSnapshot> {
        self.streams.start(request)
    }

    pub fn stop_stream(&self, stream_id: &str) -> Result<StreamSnapshot> {
        self.streams.stop(stream_id)
    }

    /// Returns the number of streams that were still running.
    pub fn stop_all_streams(&self) -> usize {
        self.streams.stop_all()
    }

    pub fn get_stream(&self, stream_id: &str) -> Result<StreamSnapshot> {
        self.streams.get(stream_id)
    }

    pub fn list_streams(&self) -> Vec<StreamSummary> {
        self.streams.list()
    }

    /// Wait until a stream reaches a terminal status.
    pub async fn wait_for_stream(&self, stream_id: &str) -> Result<StreamSnapshot> {
        self.streams.wait_finished(stream_id).await
    }

    pub async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        let sink = self.sink.get()?;
        Ok(sink.query(sql).await?)
    }

    /// Stop all streams, wait for their pipelines and close the store.
    pub async fn shutdown(&self) {
        self.streams.shutdown().await;
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::warn!(error = %e, "Failed to close store during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_feed_requires_credentials() {
        let result = ReadModel::builder().build();
        assert!(matches!(result, Err(ReadModelError::Config(_))));

        let model = ReadModel::builder()
            .with_credentials(Credentials::new(None, Some("pat".into())))
            .build()
            .unwrap();
        assert!(!model.is_initialized());
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.engine.batch_size = 0;
        let result = ReadModel::builder()
            .with_config(config)
            .with_credentials(Credentials::new(Some("alice".into()), None))
            .build();
        assert!(result.is_err());
    }
}
