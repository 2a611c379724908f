use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

use super::model::ResourceDomain;

/// What the tree layer asks the plugin host to activate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivationRequest {
    /// Every plugin whose manifest declares support for the domain.
    Domain(ResourceDomain),
    /// Plugins contributing a branch data provider for the resource type.
    ResourceType(String),
}

impl fmt::Display for ActivationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationRequest::Domain(domain) => write!(f, "domain:{}", domain),
            ActivationRequest::ResourceType(t) => write!(f, "type:{}", t),
        }
    }
}

/// Capability to activate plugins lazily. Implementations must tolerate
/// redundant calls for the same request.
#[async_trait]
pub trait ExtensionActivator: Send + Sync {
    async fn activate(&self, request: ActivationRequest) -> Result<()>;
}

/// Activator for hosts where every provider registers eagerly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivator;

#[async_trait]
impl ExtensionActivator for NoopActivator {
    async fn activate(&self, _request: ActivationRequest) -> Result<()> {
        Ok(())
    }
}
