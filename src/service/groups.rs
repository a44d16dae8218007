//! Group verbs.

use super::{ProvisioningService, ScimFilter, creation_record, payload_object, search_filter};
use crate::context::{ListQuery, ListResponse, RequestContext};
use crate::directory::{
    DirectoryClient, ModifyKind, NativeRecord, NativeValue, SearchRequest, SearchScope,
    escape_filter_value,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::NativeOperation;
use crate::mapper::{AttributeMap, TranslationRule};
use crate::membership::{MembershipResolver, decode_id, encode_id};
use log::debug;
use serde_json::Value;

/// Canonical attributes a group may be looked up by with `eq`.
const GROUP_KEYS: &[&str] = &["id", "displayName", "externalId"];

/// Native member attribute when `members.value` is not mapped.
const DEFAULT_MEMBER_ATTRIBUTE: &str = "member";

/// Percent-decode member ids that the member mapping left encoded.
///
/// The `dn` rule decodes on translation; any other rule stores values as given.
fn decode_member_values(map: &AttributeMap, record: &mut NativeRecord) -> ConnectorResult<()> {
    let Some(mapping) = map.mappings().find(|m| {
        m.is_outbound() && m.canonical().eq_ignore_ascii_case("members.value")
    }) else {
        return Ok(());
    };
    if mapping.rule() == TranslationRule::Dn {
        return Ok(());
    }
    if let Some(values) = record.remove(mapping.native()) {
        let decoded = values
            .into_values()
            .iter()
            .map(|value| decode_id(value))
            .collect::<ConnectorResult<Vec<_>>>()?;
        record.insert(mapping.native(), NativeValue::Multi(decoded));
    }
    Ok(())
}

impl<C: DirectoryClient> ProvisioningService<C> {
    /// List groups matching `query.filter`.
    ///
    /// Tenants without a group map or group base have no groups.
    pub async fn list_groups(
        &self,
        context: &RequestContext,
        query: &ListQuery,
    ) -> ConnectorResult<ListResponse> {
        self.get_groups(context, query)
            .await
            .map_err(|e| e.in_action("getGroups"))
    }

    /// Create a group and return its encoded id.
    pub async fn create_group(&self, context: &RequestContext, payload: &Value) -> ConnectorResult<String> {
        self.add_group(context, payload)
            .await
            .map_err(|e| e.in_action("createGroup"))
    }

    /// Add and remove members.
    ///
    /// Only `{"members": [{"value": ..., "operation": "delete"?}]}` is
    /// understood; members flagged `delete` are removed, all others added.
    pub async fn modify_group(
        &self,
        context: &RequestContext,
        id: &str,
        payload: &Value,
    ) -> ConnectorResult<()> {
        self.update_members(context, id, payload)
            .await
            .map_err(|e| e.in_action("modifyGroup"))
    }

    pub async fn delete_group(&self, context: &RequestContext, id: &str) -> ConnectorResult<()> {
        self.remove_group(context, id)
            .await
            .map_err(|e| e.in_action("deleteGroup"))
    }

    async fn get_groups(&self, context: &RequestContext, query: &ListQuery) -> ConnectorResult<ListResponse> {
        let config = self.config();
        let tenant = config.tenant(&context.tenant_id)?;
        let ldap = &tenant.ldap;
        debug!(
            "request={} tenant={} getGroups filter={:?} attributes={:?}",
            context.request_id, context.tenant_id, query.filter, query.attributes
        );

        let (Some(map), Some(group_base)) = (config.map.group.as_ref(), ldap.group_base.as_deref())
        else {
            debug!(
                "request={} getGroups stopped - missing configuration endpoint.map.group or groupBase",
                context.request_id
            );
            return Ok(ListResponse::default());
        };

        let attributes = map.search_attributes(&query.attributes)?;
        let display_attr = map.outbound_name("displayName")?;
        let filter = match query.filter.as_deref() {
            Some(text) => ScimFilter::parse(text)?,
            None => None,
        };

        let request = match filter {
            None => {
                let term = format!("({}=*)", display_attr);
                SearchRequest::new(
                    group_base,
                    SearchScope::Subtree,
                    search_filter(&ldap.group_object_classes, &term, ldap.group_filter.as_deref()),
                )
            }
            Some(ScimFilter::Equals { attribute, value, .. })
                if attribute.eq_ignore_ascii_case("members.value") =>
            {
                let edges = MembershipResolver::new(self.executor())
                    .resolve_groups_for_member(context, &value)
                    .await?;
                return Ok(ListResponse::new(
                    edges.iter().map(|edge| edge.to_canonical()).collect(),
                ));
            }
            Some(ScimFilter::Equals { attribute, value, .. }) if attribute.eq_ignore_ascii_case("id") => {
                SearchRequest::new(
                    decode_id(&value)?,
                    SearchScope::Base,
                    search_filter(&ldap.group_object_classes, "", ldap.group_filter.as_deref()),
                )
            }
            Some(ScimFilter::Equals { attribute, value, .. })
                if GROUP_KEYS.iter().any(|k| k.eq_ignore_ascii_case(&attribute)) =>
            {
                let (native, native_value) = map.outbound_scalar(&attribute, &decode_id(&value)?)?;
                let term = format!("({}={})", native, escape_filter_value(&native_value));
                SearchRequest::new(
                    group_base,
                    SearchScope::Subtree,
                    search_filter(&ldap.group_object_classes, &term, ldap.group_filter.as_deref()),
                )
            }
            Some(ScimFilter::Equals { raw, .. }) | Some(ScimFilter::Other { raw, .. }) => {
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
        Ok(ListResponse::new(
            records.iter().map(|record| map.inbound(record)).collect(),
        ))
    }

    async fn add_group(&self, context: &RequestContext, payload: &Value) -> ConnectorResult<String> {
        let config = self.config();
        let map = config.group_map()?;
        let tenant = config.tenant(&context.tenant_id)?;
        let base = tenant.group_base()?;
        let naming_attr = tenant.ldap.group_naming_attr.as_deref().ok_or_else(|| {
            ConnectorError::configuration("missing configuration entity.ldap.groupNamingAttr")
        })?;

        let mut object = payload_object(payload)?;
        let mut has_members = false;
        if let Some(Value::Array(members)) = object.get_mut("members") {
            for member in members.iter_mut() {
                if let Value::Object(fields) = member {
                    fields.remove("display");
                }
            }
            has_members = !members.is_empty();
        }

        let (mut record, dn) = creation_record(
            map,
            object,
            &tenant.ldap.group_object_classes,
            naming_attr,
            "displayName",
            base,
        )?;
        if has_members {
            decode_member_values(map, &mut record)?;
        } else {
            let member_attr = map
                .outbound_name("members.value")
                .unwrap_or(DEFAULT_MEMBER_ATTRIBUTE);
            record.insert(member_attr, NativeValue::Single(String::new()));
        }
        debug!("request={} createGroup dn={}", context.request_id, dn);

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

    async fn update_members(
        &self,
        context: &RequestContext,
        id: &str,
        payload: &Value,
    ) -> ConnectorResult<()> {
        let map = self.config().group_map()?;
        let dn = decode_id(id)?;

        let members = match payload.get("members") {
            Some(Value::Array(members)) => members,
            Some(_) => {
                return Err(ConnectorError::invalid_request(format!(
                    "{} - correct syntax is {{ \"members\": [...] }}",
                    payload
                )));
            }
            None => {
                return Err(ConnectorError::unsupported(
                    "only supports modification of members",
                ));
            }
        };
        let member_attr = map.outbound_name("members.value")?;

        let mut additions = Vec::new();
        let mut removals = Vec::new();
        for member in members {
            let Some(value) = member.get("value").and_then(Value::as_str).filter(|v| !v.is_empty())
            else {
                continue;
            };
            let value = decode_id(value)?;
            let removing = member
                .get("operation")
                .and_then(Value::as_str)
                .is_some_and(|op| op.eq_ignore_ascii_case("delete"));
            if removing {
                removals.push(value);
            } else {
                additions.push(value);
            }
        }
        debug!(
            "request={} modifyGroup dn={} adding {} removing {} member(s)",
            context.request_id,
            dn,
            additions.len(),
            removals.len()
        );

        for (kind, values) in [(ModifyKind::Add, additions), (ModifyKind::Delete, removals)] {
            if values.is_empty() {
                continue;
            }
            let mut changes = NativeRecord::new();
            changes.insert(member_attr, NativeValue::Multi(values));
            self.write(
                context,
                NativeOperation::Modify {
                    dn: dn.clone(),
                    kind,
                    changes,
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn remove_group(&self, context: &RequestContext, id: &str) -> ConnectorResult<()> {
        self.config().group_map()?;
        let dn = decode_id(id)?;
        debug!("request={} deleteGroup dn={}", context.request_id, dn);
        self.write(context, NativeOperation::Delete { dn }).await
    }
}
