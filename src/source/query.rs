use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Audit log method names that count as IAM activity.
pub const IAM_METHOD_ALLOWLIST: &[&str] = &[
    "CreateRole",
    "DeleteRole",
    "UndeleteRole",
    "UpdateRole",
    "CreateServiceAccount",
    "DeleteServiceAccount",
    "DisableServiceAccount",
    "EnableServiceAccount",
    "GetServiceAccount",
    "PatchServiceAccount",
    "SetIAMPolicy",
    "UndeleteServiceAccount",
    "UpdateServiceAccount",
    "CreateServiceAccountKey",
    "DeleteServiceAccountKey",
    "UploadServiceAccountKey",
    "CreateWorkloadIdentityPool",
    "DeleteWorkloadIdentityPool",
    "UndeleteWorkloadIdentityPool",
    "UpdateWorkloadIdentityPool",
    "CreateWorkloadIdentityPoolProvider",
    "DeleteWorkloadIdentityPoolProvider",
    "UndeleteWorkloadIdentityPoolProvider",
    "UpdateWorkloadIdentityPoolProvider",
    "ExchangeToken",
    "GetRole",
    "ListRoles",
    "QueryGrantableRoles",
    "GetEffectivePolicy",
    "GenerateAccessToken",
    "GenerateIdToken",
    "ListServiceAccounts",
    "SignBlob",
    "SignJwt",
    "GetServiceAccountKey",
    "ListServiceAccountKeys",
    "GetWorkloadIdentityPool",
    "ListWorkloadIdentityPools",
    "GetWorkloadIdentityPoolProvider",
    "ListWorkloadIdentityPoolProviders",
];

pub const DEFAULT_RESOURCE_BATCH_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceParseError {
    #[error("resource '{0}' must have the form <type>/<project_id>")]
    Malformed(String),

    #[error("resource '{0}' contains a double quote")]
    Quoted(String),
}

/// One partition of the log source: a resource type within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    pub resource_type: String,
    pub project_id: String,
}

impl ResourceDescriptor {
    pub fn new(resource_type: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            project_id: project_id.into(),
        }
    }

    /// Parse a comma-separated list, skipping empty items.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ResourceParseError> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for ResourceDescriptor {
    type Err = ResourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(resource_type), Some(project_id), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ResourceParseError::Malformed(s.to_string()));
        };

        let (resource_type, project_id) = (resource_type.trim(), project_id.trim());
        if resource_type.is_empty() || project_id.is_empty() {
            return Err(ResourceParseError::Malformed(s.to_string()));
        }
        if s.contains('"') {
            return Err(ResourceParseError::Quoted(s.to_string()));
        }

        Ok(Self::new(resource_type, project_id))
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.project_id)
    }
}

/// Split resources into fixed-size batches, preserving order.
pub fn partition(resources: &[ResourceDescriptor], batch_size: usize) -> Vec<&[ResourceDescriptor]> {
    resources.chunks(batch_size.max(1)).collect()
}

/// Builds Cloud Logging filter expressions for a window start and resource batch.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    method_clause: String,
}

impl QueryPlanner {
    pub fn new<S: AsRef<str>>(methods: &[S]) -> Self {
        let methods = methods
            .iter()
            .map(|m| format!("\"{}\"", m.as_ref()))
            .collect::<Vec<_>>()
            .join(" OR ");

        Self {
            method_clause: format!("protoPayload.methodName:({})", methods),
        }
    }

    /// Filter selecting allow-listed methods at or after `start` for one batch.
    ///
    /// Resource pairs are parenthesized: the query language binds OR tighter
    /// than AND.
    pub fn build(&self, batch: &[ResourceDescriptor], start: &str) -> String {
        let mut filter = format!("{} AND timestamp>=\"{}\"", self.method_clause, start);

        if !batch.is_empty() {
            let resources = batch
                .iter()
                .map(|r| {
                    format!(
                        "(resource.type=\"{}\" AND resource.labels.project_id=\"{}\")",
                        r.resource_type, r.project_id
                    )
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            filter.push_str(&format!(" AND ({})", resources));
        }

        filter
    }

    /// `projects/<id>` names to search for one batch, deduplicated and sorted
    pub fn resource_names(batch: &[ResourceDescriptor]) -> Vec<String> {
        batch
            .iter()
            .map(|r| format!("projects/{}", r.project_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new(IAM_METHOD_ALLOWLIST)
    }
}
