//! Native operation dispatch.
//!
//! The [`RequestExecutor`] runs one [`NativeOperation`] per call: it acquires a
//! bound session for the request's tenant, dispatches the operation, normalizes
//! the outcome and releases the session. Successful requests unbind the session;
//! failed ones destroy it so a half-broken connection is never reused.
//!
//! Searches are paged and drained through a [`SearchStream`]. A search whose
//! base object does not exist yields an empty result rather than an error.
//! Two directory errors are recovered from:
//!
//! * removing the last value of a mandatory attribute (`objectClassViolation`)
//!   is retried as a replace with a single empty value
//! * adding a value that is already present (`attributeOrValueExists`) is a
//!   no-op; remaining new values are still added

mod stream;

pub use stream::SearchStream;

use crate::connection::ConnectionManager;
use crate::context::RequestContext;
use crate::directory::{
    DirectoryClient, DirectorySession, ModifyKind, NativeRecord, NativeValue, SearchRequest,
    result_code,
};
use crate::error::ConnectorResult;
use log::{debug, error};
use serde_json::{Map, Value};

/// Attributes whose values never appear in logs.
const SECRET_ATTRIBUTES: &[&str] = &["userPassword", "unicodePwd"];

/// A directory operation in native terms.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeOperation {
    Search(SearchRequest),
    Add {
        dn: String,
        attributes: NativeRecord,
    },
    Modify {
        dn: String,
        kind: ModifyKind,
        changes: NativeRecord,
    },
    Delete {
        dn: String,
    },
}

impl NativeOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Add { .. } => "add",
            Self::Modify { .. } => "modify",
            Self::Delete { .. } => "delete",
        }
    }

    /// Search base or target DN.
    pub fn target(&self) -> &str {
        match self {
            Self::Search(request) => &request.base,
            Self::Add { dn, .. } | Self::Modify { dn, .. } | Self::Delete { dn } => dn,
        }
    }

    /// Log-safe approximation of the operation payload.
    fn describe(&self) -> String {
        match self {
            Self::Search(request) => format!(
                "{{\"scope\":\"{:?}\",\"filter\":\"{}\",\"attributes\":{:?}}}",
                request.scope, request.filter, request.attributes
            ),
            Self::Add { attributes, .. } => redacted(attributes),
            Self::Modify { kind, changes, .. } => {
                format!("{{\"operation\":\"{:?}\",\"changes\":{}}}", kind, redacted(changes))
            }
            Self::Delete { .. } => "{}".to_string(),
        }
    }
}

fn redacted(record: &NativeRecord) -> String {
    let object: Map<String, Value> = record
        .iter()
        .map(|(name, value)| {
            let shown = if SECRET_ATTRIBUTES.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                Value::String("***REDACTED***".to_string())
            } else {
                match value {
                    NativeValue::Single(v) => Value::String(v.clone()),
                    NativeValue::Multi(vs) => {
                        Value::Array(vs.iter().cloned().map(Value::String).collect())
                    }
                }
            };
            (name.clone(), shown)
        })
        .collect();
    Value::Object(object).to_string()
}

/// Outcome of a native operation.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeResult {
    /// Flattened search results in delivery order
    Records(Vec<NativeRecord>),
    /// Write completed
    Done,
}

impl NativeResult {
    pub fn into_records(self) -> Vec<NativeRecord> {
        match self {
            Self::Records(records) => records,
            Self::Done => Vec::new(),
        }
    }
}

/// Runs native operations against a tenant's directory.
pub struct RequestExecutor<C: DirectoryClient> {
    connections: ConnectionManager<C>,
    page_size: u32,
}

impl<C: DirectoryClient> RequestExecutor<C> {
    pub fn new(connections: ConnectionManager<C>) -> Self {
        let page_size = connections.config().page_size;
        Self {
            connections,
            page_size,
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    /// Acquire a session, run `operation` and release the session.
    pub async fn execute(
        &self,
        context: &RequestContext,
        operation: NativeOperation,
    ) -> ConnectorResult<NativeResult> {
        let payload = operation.describe();

        let mut session = match self
            .connections
            .acquire(&context.tenant_id, context.authorization())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(
                    "request={} tenant={} method={} base={} options={} connect error: {}",
                    context.request_id,
                    context.tenant_id,
                    operation.name(),
                    operation.target(),
                    payload,
                    e
                );
                return Err(e);
            }
        };

        match self.dispatch(&mut session, &operation).await {
            Ok(result) => {
                if let Err(e) = session.unbind().await {
                    debug!("request={} unbind failed: {}", context.request_id, e);
                }
                debug!(
                    "request={} tenant={} method={} base={} options={} completed",
                    context.request_id,
                    context.tenant_id,
                    operation.name(),
                    operation.target(),
                    payload
                );
                Ok(result)
            }
            Err(e) => {
                session.destroy();
                error!(
                    "request={} tenant={} method={} base={} options={} error: {}",
                    context.request_id,
                    context.tenant_id,
                    operation.name(),
                    operation.target(),
                    payload,
                    e
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        session: &mut C::Session,
        operation: &NativeOperation,
    ) -> ConnectorResult<NativeResult> {
        match operation {
            NativeOperation::Search(request) => self.search(session, request).await,
            NativeOperation::Add { dn, attributes } => {
                let attributes: Vec<(String, Vec<String>)> = attributes
                    .to_changes()
                    .into_iter()
                    .filter(|(_, values)| !values.is_empty())
                    .collect();
                session
                    .add(dn, &attributes)
                    .await
                    .map_err(|e| e.into_connector_error(dn))?;
                Ok(NativeResult::Done)
            }
            NativeOperation::Modify { dn, kind, changes } => {
                self.modify(session, dn, *kind, changes).await
            }
            NativeOperation::Delete { dn } => {
                session
                    .delete(dn)
                    .await
                    .map_err(|e| e.into_connector_error(dn))?;
                Ok(NativeResult::Done)
            }
        }
    }

    async fn search(
        &self,
        session: &mut C::Session,
        request: &SearchRequest,
    ) -> ConnectorResult<NativeResult> {
        let mut stream = SearchStream::new(session, request, self.page_size);
        let mut records = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(entry)) => records.push(entry.into_record()),
                Ok(None) => break,
                Err(e) if e.is_no_such_object() => {
                    debug!("search base={} does not exist, returning empty result", request.base);
                    return Ok(NativeResult::Records(Vec::new()));
                }
                Err(e) => return Err(e.into_connector_error(&request.base)),
            }
        }
        Ok(NativeResult::Records(records))
    }

    async fn modify(
        &self,
        session: &mut C::Session,
        dn: &str,
        kind: ModifyKind,
        changes: &NativeRecord,
    ) -> ConnectorResult<NativeResult> {
        let changes = changes.to_changes();
        if changes.is_empty() {
            return Ok(NativeResult::Done);
        }

        match session.modify(dn, kind, &changes).await {
            Ok(()) => Ok(NativeResult::Done),
            Err(e)
                if kind == ModifyKind::Delete
                    && e.result_code() == Some(result_code::OBJECT_CLASS_VIOLATION) =>
            {
                debug!("dn={} delete violates object class, removing attributes one by one", dn);
                for change in &changes {
                    let single = [change.clone()];
                    match session.modify(dn, ModifyKind::Delete, &single).await {
                        Ok(()) => {}
                        Err(e) if e.result_code() == Some(result_code::OBJECT_CLASS_VIOLATION) => {
                            debug!(
                                "dn={} removing last value of mandatory attribute {}, replacing with empty value",
                                dn, change.0
                            );
                            let placeholder = [(change.0.clone(), vec![String::new()])];
                            session
                                .modify(dn, ModifyKind::Replace, &placeholder)
                                .await
                                .map_err(|e| e.into_connector_error(dn))?;
                        }
                        Err(e) => return Err(e.into_connector_error(dn)),
                    }
                }
                Ok(NativeResult::Done)
            }
            Err(e)
                if kind == ModifyKind::Add
                    && e.result_code() == Some(result_code::ATTRIBUTE_OR_VALUE_EXISTS) =>
            {
                debug!("dn={} some values already present, adding one by one", dn);
                for (name, values) in &changes {
                    for value in values {
                        let single = [(name.clone(), vec![value.clone()])];
                        match session.modify(dn, ModifyKind::Add, &single).await {
                            Ok(()) => {}
                            Err(e)
                                if e.result_code()
                                    == Some(result_code::ATTRIBUTE_OR_VALUE_EXISTS) => {}
                            Err(e) => return Err(e.into_connector_error(dn)),
                        }
                    }
                }
                Ok(NativeResult::Done)
            }
            Err(e) => Err(e.into_connector_error(dn)),
        }
    }
}
