//! gRPC client for onos-topo.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::debug;

use super::{RegistryConnector, RegistryError, TopoRegistry};
use crate::config::TopoEndpoint;
use crate::proto::topo::topo_client::TopoClient;
use crate::proto::topo::{CreateRequest, DeleteRequest, GetRequest, Object};

/// Registry handle backed by a tonic channel.
#[derive(Clone)]
pub struct GrpcTopoClient {
    inner: TopoClient<Channel>,
}

impl GrpcTopoClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: TopoClient::new(channel),
        }
    }

    /// Connect to an onos-topo endpoint.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let connect_err = |reason: String| RegistryError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| connect_err(e.to_string()))?
            .connect_timeout(timeout)
            .connect()
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl TopoRegistry for GrpcTopoClient {
    async fn get(&self, id: &str) -> Result<Object, RegistryError> {
        debug!("Getting object {} from onos-topo", id);
        let mut client = self.inner.clone();
        let response = client
            .get(GetRequest { id: id.to_string() })
            .await
            .map_err(|status| RegistryError::from_status(id, status))?;
        response
            .into_inner()
            .object
            .ok_or_else(|| RegistryError::Unknown(format!("empty get response for {id}")))
    }

    async fn create(&self, object: Object) -> Result<(), RegistryError> {
        debug!("Creating object {} in onos-topo", object.id);
        let id = object.id.clone();
        let mut client = self.inner.clone();
        client
            .create(CreateRequest {
                object: Some(object),
            })
            .await
            .map_err(|status| RegistryError::from_status(&id, status))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        debug!("Deleting object {} in onos-topo", id);
        let mut client = self.inner.clone();
        client
            .delete(DeleteRequest {
                id: id.to_string(),
                revision: 0,
            })
            .await
            .map_err(|status| RegistryError::from_status(id, status))?;
        Ok(())
    }
}

/// Dials onos-topo in the namespace of the resource being reconciled.
pub struct GrpcConnector {
    endpoint: TopoEndpoint,
}

impl GrpcConnector {
    pub fn new(endpoint: TopoEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl RegistryConnector for GrpcConnector {
    async fn connect(&self, namespace: &str) -> Result<Box<dyn TopoRegistry>, RegistryError> {
        let endpoint = self.endpoint.resolve(namespace);
        debug!("Connecting to onos-topo at {}", endpoint);
        let client = GrpcTopoClient::connect(&endpoint, self.endpoint.connect_timeout).await?;
        Ok(Box::new(client))
    }
}
