//! Store dispatching on the endpoint scheme

use async_trait::async_trait;
use std::path::Path;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::local::LocalStore;
use crate::xrootd::XrootdStore;
use crate::RemoteStore;

/// Sends XRootD endpoints to [`XrootdStore`] and everything else to
/// [`LocalStore`], so one job can mix both kinds of endpoint.
#[derive(Debug, Clone, Default)]
pub struct RoutingStore {
    xrootd: XrootdStore,
    local: LocalStore,
}

impl RoutingStore {
    pub fn new(xrootd: XrootdStore) -> Self {
        Self {
            xrootd,
            local: LocalStore::new(),
        }
    }

    fn route(&self, endpoint: &Endpoint) -> &dyn RemoteStore {
        if endpoint.is_xrootd() {
            &self.xrootd
        } else {
            &self.local
        }
    }
}

#[async_trait]
impl RemoteStore for RoutingStore {
    async fn mkdir_all(&self, endpoint: &Endpoint, path: &str) -> Result<()> {
        self.route(endpoint).mkdir_all(endpoint, path).await
    }

    async fn put(&self, endpoint: &Endpoint, local: &Path, remote_path: &str) -> Result<()> {
        self.route(endpoint).put(endpoint, local, remote_path).await
    }

    async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<String>> {
        self.route(endpoint).list(endpoint, path).await
    }

    async fn read_to_string(&self, endpoint: &Endpoint, path: &str) -> Result<String> {
        self.route(endpoint).read_to_string(endpoint, path).await
    }
}
