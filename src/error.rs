//! Error types for connector operations.
//!
//! Every failure surfaced by the connector is a [`ConnectorError`]. Errors are
//! classified into a small set of [`ErrorKind`]s so that a front end can map
//! them onto protocol status codes without inspecting message text. Errors that
//! cross the provisioning boundary are wrapped with the name of the action that
//! produced them (for example `createUser error: ...`); classification sees
//! through that wrapper.

/// Stable message used when a bind is rejected because of bad credentials.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "LdapErr: connect failure, invalid user/password";

/// Classification of connector errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or inconsistent configuration
    Configuration,
    /// Filter or operation the connector deliberately does not support
    UnsupportedOperation,
    /// Transient connection-layer failure (timeout, refused)
    Connection,
    /// Bind rejected by the directory
    Authentication,
    /// Entry already exists
    Conflict,
    /// Directory schema rejected the change
    SchemaViolation,
    /// Entry or search base does not exist
    NotFound,
    /// Canonical attribute that cannot be mapped
    Translation,
    /// Malformed caller input
    InvalidRequest,
    /// Any other directory failure
    Directory,
}

/// Main error type for connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Missing mandatory mapping or tenant configuration
    #[error("{message}")]
    Configuration { message: String },

    /// Advanced filtering, member-of-user filtering and similar requests
    #[error("{message}")]
    UnsupportedOperation { message: String },

    /// Transient failure reaching an endpoint
    #[error("{message}")]
    Connection { endpoint: String, message: String },

    /// Bind rejected
    #[error("{message}")]
    Authentication { message: String },

    /// Entry already exists at the target distinguished name
    #[error("ENTRY_EXISTS: {dn} {message}")]
    Conflict { dn: String, message: String },

    /// Schema violation reported by the directory
    #[error("Objectclass Violation: {message}")]
    SchemaViolation { dn: String, message: String },

    /// Entry or base object does not exist
    #[error("NO_OBJECT: {dn} {message}")]
    NotFound { dn: String, message: String },

    /// Unmappable canonical attribute
    #[error("{message}")]
    Translation { message: String },

    /// Malformed request payload or identifier
    #[error("{message}")]
    InvalidRequest { message: String },

    /// Directory operation failed with a result code not handled elsewhere
    #[error("LDAP error code {code}: {message}")]
    Directory { code: u32, message: String },

    /// Error raised while performing a named provisioning action
    #[error("{action} error: {source}")]
    Action {
        action: String,
        #[source]
        source: Box<ConnectorError>,
    },
}

impl ConnectorError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Create a transient connection error
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a translation error
    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Wrap this error with the name of the action that produced it.
    ///
    /// Wrapping is idempotent per action: an error already tagged with the
    /// same action is returned unchanged.
    pub fn in_action(self, action: impl Into<String>) -> Self {
        let action = action.into();
        if let Self::Action {
            action: existing, ..
        } = &self
        {
            if *existing == action {
                return self;
            }
        }
        Self::Action {
            action,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through action wrappers.
    pub fn root(&self) -> &ConnectorError {
        match self {
            Self::Action { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Action { source, .. } => source.kind(),
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Translation { .. } => ErrorKind::Translation,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Directory { .. } => ErrorKind::Directory,
        }
    }

    /// HTTP-style status a front end should report for this error.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Conflict => 409,
            ErrorKind::Authentication => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::UnsupportedOperation
            | ErrorKind::Translation
            | ErrorKind::InvalidRequest => 400,
            ErrorKind::Connection => 503,
            ErrorKind::Configuration | ErrorKind::SchemaViolation | ErrorKind::Directory => 500,
        }
    }

    /// Whether the failure should trigger failover to another endpoint.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

/// Result type alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
