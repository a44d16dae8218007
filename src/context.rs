//! Request context and query structures for connector operations.
//!
//! Every call into the connector carries a [`RequestContext`] naming the
//! tenant ("baseEntity") it targets. The context also carries a request id used
//! to correlate log lines and, when pass-through authentication is enabled, the
//! caller's authorization header.

use uuid::Uuid;

/// Request context for connector operations.
#[derive(Clone)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    /// Tenant the request targets
    pub tenant_id: String,
    /// Raw `Authorization` header of the inbound request, if any
    authorization: Option<String>,
}

impl RequestContext {
    /// Create a new request context with a generated request ID.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            authorization: None,
        }
    }

    /// Create a new request context with a specific request ID.
    pub fn with_request_id(tenant_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tenant_id: tenant_id.into(),
            authorization: None,
        }
    }

    /// Attach the caller's authorization header.
    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("tenant_id", &self.tenant_id)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

/// Query parameters for listing users or groups.
///
/// Paging of the response is the front end's concern; the connector always
/// returns the complete result set for a filter.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// SCIM filter expression
    pub filter: Option<String>,
    /// Canonical attributes to include in results; empty means all mapped attributes
    pub attributes: Vec<String>,
}

impl ListQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a filter expression.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Add an attribute to include in results.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Add multiple attributes to include in results.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }
}

/// Result of a list operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResponse {
    pub resources: Vec<serde_json::Value>,
}

impl ListResponse {
    pub fn new(resources: Vec<serde_json::Value>) -> Self {
        Self { resources }
    }

    pub fn total_results(&self) -> usize {
        self.resources.len()
    }
}
