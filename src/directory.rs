use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::{
    Client, ResourceExt,
    api::{Api, ListParams},
};

/// A service as seen by one scan cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub namespace: String,
    /// Exposed ports, in declaration order and without duplicates
    pub ports: Vec<u16>,
}

impl ServiceTarget {
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ports,
        }
    }

    /// In-cluster DNS name, e.g. `api.default.svc.cluster.local`
    #[must_use]
    pub fn host(&self, cluster_domain: &str) -> String {
        format!("{}.{}.svc.{cluster_domain}", self.name, self.namespace)
    }
}

/// Source of truth for which services and ports currently exist
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// List every service of the cluster
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be obtained
    async fn list_services(&self) -> Result<Vec<ServiceTarget>>;
}

/// Directory backed by the Kubernetes API, cluster-wide
#[derive(Clone)]
pub struct KubeDirectory {
    api: Api<Service>,
}

impl KubeDirectory {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    /// Use the in-cluster service account, falling back to the local kubeconfig
    ///
    /// # Errors
    ///
    /// Returns an error if no usable cluster configuration is found
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ServiceDirectory for KubeDirectory {
    async fn list_services(&self) -> Result<Vec<ServiceTarget>> {
        let services = self
            .api
            .list(&ListParams::default())
            .await
            .context("failed to list services")?;

        Ok(services.items.iter().map(target_from_service).collect())
    }
}

fn target_from_service(service: &Service) -> ServiceTarget {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .map(tcp_ports)
        .unwrap_or_default();

    ServiceTarget {
        name: service.name_any(),
        namespace: service.namespace().unwrap_or_default(),
        ports,
    }
}

/// TCP ports only (protocol defaults to TCP when unset), deduplicated
fn tcp_ports(ports: &[ServicePort]) -> Vec<u16> {
    let mut out: Vec<u16> = Vec::with_capacity(ports.len());
    for port in ports {
        let is_tcp = port.protocol.as_deref().is_none_or(|p| p == "TCP");
        if let Ok(number) = u16::try_from(port.port)
            && is_tcp
            && !out.contains(&number)
        {
            out.push(number);
        }
    }
    out
}
