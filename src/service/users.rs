//! User verbs.

use super::{ProvisioningService, ScimFilter, creation_record, payload_object, remove_ci, search_filter};
use crate::context::{ListQuery, ListResponse, RequestContext};
use crate::directory::{
    DN_KEY, DirectoryClient, ModifyKind, SearchRequest, SearchScope, escape_filter_value,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::NativeOperation;
use crate::membership::{decode_id, encode_id};
use log::debug;
use serde_json::{Map, Value};

/// Entitlement type that overrides the container of a new user.
const USER_BASE_ENTITLEMENT: &str = "userbase";

impl<C: DirectoryClient> ProvisioningService<C> {
    /// List users matching `query.filter`; every user carries a `groups` list.
    pub async fn list_users(
        &self,
        context: &RequestContext,
        query: &ListQuery,
    ) -> ConnectorResult<ListResponse> {
        self.get_users(context, query)
            .await
            .map_err(|e| e.in_action("getUsers"))
    }

    /// Create a user and return its encoded id.
    pub async fn create_user(&self, context: &RequestContext, payload: &Value) -> ConnectorResult<String> {
        self.add_user(context, payload)
            .await
            .map_err(|e| e.in_action("createUser"))
    }

    /// Replace the attributes present in `payload`.
    pub async fn modify_user(
        &self,
        context: &RequestContext,
        id: &str,
        payload: &Value,
    ) -> ConnectorResult<()> {
        self.replace_user_attributes(context, id, payload)
            .await
            .map_err(|e| e.in_action("modifyUser"))
    }

    pub async fn delete_user(&self, context: &RequestContext, id: &str) -> ConnectorResult<()> {
        self.remove_user(context, id)
            .await
            .map_err(|e| e.in_action("deleteUser"))
    }

    async fn get_users(&self, context: &RequestContext, query: &ListQuery) -> ConnectorResult<ListResponse> {
        let config = self.config();
        let tenant = config.tenant(&context.tenant_id)?;
        let map = &config.map.user;
        let ldap = &tenant.ldap;
        debug!(
            "request={} tenant={} getUsers filter={:?} attributes={:?}",
            context.request_id, context.tenant_id, query.filter, query.attributes
        );

        let attributes = map.search_attributes(&query.attributes)?;
        let filter = match query.filter.as_deref() {
            Some(text) => ScimFilter::parse(text)?,
            None => None,
        };

        let request = match filter {
            None => SearchRequest::new(
                ldap.user_base.as_str(),
                SearchScope::Subtree,
                search_filter(&ldap.user_object_classes, "", ldap.user_filter.as_deref()),
            ),
            Some(ScimFilter::Equals { attribute, raw, .. })
                if attribute.eq_ignore_ascii_case("groups.value") =>
            {
                return Err(ConnectorError::unsupported(format!(
                    "not supporting groups member of user filtering: {}",
                    raw
                )));
            }
            Some(ScimFilter::Equals { attribute, value, .. }) if attribute.eq_ignore_ascii_case("id") => {
                SearchRequest::new(
                    decode_id(&value)?,
                    SearchScope::Base,
                    search_filter(&ldap.user_object_classes, "", ldap.user_filter.as_deref()),
                )
            }
            Some(ScimFilter::Equals { attribute, value, .. }) => {
                let (native, native_value) = map.outbound_scalar(&attribute, &value)?;
                let term = format!("({}={})", native, escape_filter_value(&native_value));
                SearchRequest::new(
                    ldap.user_base.as_str(),
                    SearchScope::Subtree,
                    search_filter(&ldap.user_object_classes, &term, ldap.user_filter.as_deref()),
                )
            }
            Some(ScimFilter::Other { raw, .. }) => {
                return Err(ConnectorError::unsupported(format!(
                    "not supporting simpel filtering: {}",
                    raw
                )));
            }
            Some(ScimFilter::Advanced { raw }) => {
                return Err(ConnectorError::unsupported(format!(
                    "not supporting advanced filtering: {}",
                    raw
                )));
            }
        }
        .with_attributes(attributes);

        let records = self.search(context, NativeOperation::Search(request)).await?;
        let resources = records
            .iter()
            .map(|record| {
                let mut user = map.inbound(record);
                if let Value::Object(object) = &mut user {
                    object
                        .entry("groups")
                        .or_insert_with(|| Value::Array(Vec::new()));
                }
                user
            })
            .collect();
        Ok(ListResponse::new(resources))
    }

    async fn add_user(&self, context: &RequestContext, payload: &Value) -> ConnectorResult<String> {
        let config = self.config();
        let tenant = config.tenant(&context.tenant_id)?;
        let ldap = &tenant.ldap;

        let mut object = payload_object(payload)?;
        remove_ci(&mut object, "groups");
        let base = take_user_base(&mut object).unwrap_or_else(|| ldap.user_base.clone());

        let (record, dn) = creation_record(
            &config.map.user,
            object,
            &ldap.user_object_classes,
            &ldap.user_naming_attr,
            "userName",
            &base,
        )?;
        debug!("request={} createUser dn={}", context.request_id, dn);

        self.write(
            context,
            NativeOperation::Add {
                dn: dn.clone(),
                attributes: record,
            },
        )
        .await?;
        Ok(encode_id(&dn))
    }

    async fn replace_user_attributes(
        &self,
        context: &RequestContext,
        id: &str,
        payload: &Value,
    ) -> ConnectorResult<()> {
        let dn = decode_id(id)?;
        let mut object = payload_object(payload)?;
        remove_ci(&mut object, "groups");
        if object.is_empty() {
            debug!("request={} modifyUser dn={} nothing to change", context.request_id, dn);
            return Ok(());
        }

        let mut changes = self.config().map.user.outbound_object(&Value::Object(object))?;
        changes.remove(DN_KEY);
        if changes.is_empty() {
            return Ok(());
        }

        self.write(
            context,
            NativeOperation::Modify {
                dn,
                kind: ModifyKind::Replace,
                changes,
            },
        )
        .await
    }

    async fn remove_user(&self, context: &RequestContext, id: &str) -> ConnectorResult<()> {
        let dn = decode_id(id)?;
        debug!("request={} deleteUser dn={}", context.request_id, dn);
        self.write(context, NativeOperation::Delete { dn }).await
    }
}

/// Remove the `userbase` entitlement and return its value.
///
/// Accepts the list form (`[{"type": "userbase", "value": ...}]`) and the
/// keyed form (`{"userbase": {"value": ...}}`).
fn take_user_base(object: &mut Map<String, Value>) -> Option<String> {
    let key = object
        .keys()
        .find(|k| k.eq_ignore_ascii_case("entitlements"))
        .cloned()?;

    let (base, now_empty) = match object.get_mut(&key)? {
        Value::Array(elements) => {
            let position = elements.iter().position(|element| {
                element
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.eq_ignore_ascii_case(USER_BASE_ENTITLEMENT))
            })?;
            let element = elements.remove(position);
            let base = element.get("value").and_then(Value::as_str).map(str::to_string);
            (base, elements.is_empty())
        }
        Value::Object(keyed) => {
            let entry = remove_ci(keyed, USER_BASE_ENTITLEMENT)?;
            let base = entry.get("value").and_then(Value::as_str).map(str::to_string);
            (base, keyed.is_empty())
        }
        _ => return None,
    };

    if now_empty {
        object.remove(&key);
    }
    base.filter(|b| !b.trim().is_empty())
}
