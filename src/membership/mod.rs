//! Reverse group membership.
//!
//! The directory stores membership on the group (`member: <user dn>`), while
//! callers ask which groups a user belongs to. [`MembershipResolver`] answers
//! that by searching the group subtree for groups naming the member, after
//! first translating SID or GUID member ids to a distinguished name when the
//! connector is configured to hand those out.

mod identifiers;

pub use identifiers::{Sid, decode_id, encode_id, guid_to_hex};

use crate::config::MemberIdKind;
use crate::context::RequestContext;
use crate::directory::{
    DN_KEY, DirectoryClient, SearchRequest, SearchScope, escape_filter_value, object_class_filter,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{NativeOperation, RequestExecutor};
use log::debug;
use serde_json::{Value, json};

/// One group a member belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEdge {
    /// Percent-encoded group identifier
    pub group_id: String,
    pub group_display_name: Option<String>,
    /// Percent-encoded member identifier as handed in by the caller
    pub member_user_id: String,
}

impl MembershipEdge {
    /// Canonical group object listing only this member.
    pub fn to_canonical(&self) -> Value {
        json!({
            "id": self.group_id,
            "displayName": self.group_display_name,
            "members": [{ "value": self.member_user_id }]
        })
    }
}

/// Derives "member-of" relations for a member identifier.
pub struct MembershipResolver<'a, C: DirectoryClient> {
    executor: &'a RequestExecutor<C>,
}

impl<'a, C: DirectoryClient> MembershipResolver<'a, C> {
    pub fn new(executor: &'a RequestExecutor<C>) -> Self {
        Self { executor }
    }

    /// Every group of the tenant's group subtree that lists `member_id`.
    pub async fn resolve_groups_for_member(
        &self,
        context: &RequestContext,
        member_id: &str,
    ) -> ConnectorResult<Vec<MembershipEdge>> {
        let config = self.executor.connections().config();
        let map = config.group_map()?;
        let tenant = config.tenant(&context.tenant_id)?;
        let group_base = tenant.group_base()?;

        let decoded = decode_id(member_id)?;
        let member_dn = self.member_dn(context, config.member_id_kind, &decoded).await?;

        let member_attr = map.outbound_name("members.value")?;
        let id_attr = map.outbound_name("id")?;
        let display_attr = map.outbound_name("displayName")?;

        let filter = format!(
            "(&{}({}={}){})",
            object_class_filter(&tenant.ldap.group_object_classes),
            member_attr,
            escape_filter_value(&member_dn),
            tenant.ldap.group_filter.as_deref().unwrap_or_default()
        );
        let request = SearchRequest::new(group_base, SearchScope::Subtree, filter)
            .with_attributes(
                [id_attr, display_attr]
                    .into_iter()
                    .filter(|name| !name.eq_ignore_ascii_case(DN_KEY)),
            );

        let groups = self
            .executor
            .execute(context, NativeOperation::Search(request))
            .await?
            .into_records();

        let member_user_id = member_id.to_string();
        let edges: Vec<MembershipEdge> = groups
            .iter()
            .filter_map(|group| {
                let id = group.get(id_attr).and_then(|v| v.first())?;
                Some(MembershipEdge {
                    group_id: encode_id(id),
                    group_display_name: group
                        .get(display_attr)
                        .and_then(|v| v.first())
                        .map(str::to_string),
                    member_user_id: member_user_id.clone(),
                })
            })
            .collect();

        debug!(
            "request={} member={} is in {} group(s)",
            context.request_id,
            member_dn,
            edges.len()
        );
        Ok(edges)
    }

    /// Distinguished name of the member, looked up by SID or GUID when configured.
    async fn member_dn(
        &self,
        context: &RequestContext,
        kind: MemberIdKind,
        member_id: &str,
    ) -> ConnectorResult<String> {
        let (base, label) = match kind {
            MemberIdKind::Dn => return Ok(member_id.to_string()),
            MemberIdKind::Sid => {
                let sid: Sid = member_id.parse()?;
                (format!("<SID={}>", sid), "objectSid")
            }
            MemberIdKind::Guid => (format!("<GUID={}>", guid_to_hex(member_id)?), "objectGUID"),
        };

        let request = SearchRequest::new(base, SearchScope::Base, "(objectClass=*)")
            .with_attributes(["objectClass"]);
        let mut matches = self
            .executor
            .execute(context, NativeOperation::Search(request))
            .await?
            .into_records();

        match matches.len() {
            1 => matches
                .pop()
                .and_then(|record| record.dn().map(str::to_string))
                .ok_or_else(|| {
                    ConnectorError::invalid_request(format!(
                        "entry having {}={} has no distinguished name",
                        label, member_id
                    ))
                }),
            0 => Err(ConnectorError::NotFound {
                dn: member_id.to_string(),
                message: format!("did not find unique user having {}={}", label, member_id),
            }),
            _ => Err(ConnectorError::invalid_request(format!(
                "did not find unique user having {}={}",
                label, member_id
            ))),
        }
    }
}
