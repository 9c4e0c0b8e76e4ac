//! Provider identity: where the records live and how to authenticate.
//!
//! Passed explicitly into constructors; nothing here reads process-wide state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Default host of the work-tracking service.
pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// A credential for the provider. Assumed valid; no auth flow is managed here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum Credential {
    /// Personal access token, sent as HTTP Basic with an empty user name
    Pat(String),
    /// OAuth bearer token
    Bearer(String),
}

impl Credential {
    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        match self {
            Credential::Pat(token) => {
                format!("Basic {}", STANDARD.encode(format!(":{token}")))
            }
            Credential::Bearer(token) => format!("Bearer {token}"),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Pat(_) => f.write_str("Pat(<redacted>)"),
            Credential::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Organization, project and credential of the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub organization: String,
    pub project: String,
    pub credential: Credential,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl ProviderIdentity {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            credential,
            base_url: default_base_url(),
        }
    }

    /// Point at a different host (on-prem server, local mock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn organization_url(&self) -> String {
        format!("{}/{}", self.base_url, self.organization)
    }

    pub fn project_url(&self) -> String {
        format!("{}/{}", self.organization_url(), self.project)
    }

    /// The fixed batch endpoint every envelope is POSTed to.
    pub fn batch_url(&self, api_version: &str) -> String {
        format!(
            "{}/_apis/wit/$batch?api-version={api_version}",
            self.organization_url()
        )
    }

    /// Provider-relative target of a single record, suitable for an `OperationDescriptor`.
    pub fn work_item_path(&self, id: u64, api_version: &str) -> String {
        format!("/{}/_apis/wit/workitems/{id}?api-version={api_version}", self.project)
    }

    pub fn work_item_url(&self, id: u64, api_version: &str) -> String {
        format!(
            "{}{}",
            self.organization_url(),
            self.work_item_path(id, api_version)
        )
    }

    pub fn query_url(&self, api_version: &str) -> String {
        format!("{}/_apis/wit/wiql?api-version={api_version}", self.project_url())
    }
}
