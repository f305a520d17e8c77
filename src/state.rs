use crate::{config::Secret, datasource::SharedDatasource, services::file_service::FileStore};

/// Shared handler state. The datasource is injected here once at startup and
/// is the only way handlers reach object storage.
#[derive(Clone)]
pub struct AppState {
    pub datasource: SharedDatasource,
    pub files: FileStore,
    pub api_token: Option<Secret>,
}

impl AppState {
    pub fn new(datasource: SharedDatasource, files: FileStore, api_token: Option<Secret>) -> Self {
        Self {
            datasource,
            files,
            api_token,
        }
    }
}
