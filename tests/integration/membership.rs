//! Member-of lookups through `members.value eq` group filters.

use crate::common::*;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use scim_ldap_connector::context::ListQuery;
use scim_ldap_connector::error::ErrorKind;
use scim_ldap_connector::membership::encode_id;
use serde_json::json;

const ALICE_SID: &str = "S-1-5-21-3623811015-3361044348-30300820-1013";

fn alice_guid() -> String {
    STANDARD.encode([
        0x3f, 0x2c, 0x91, 0x5e, 0x7a, 0x01, 0x4b, 0x4c, 0x9d, 0x11, 0x0c, 0x55, 0xa2, 0x6b, 0x10,
        0xe4,
    ])
}

async fn seeded() -> scim_ldap_connector::InMemoryDirectory {
    let directory = directory().await;
    directory
        .insert_entry(
            &user_dn("alice"),
            [
                ("objectClass", vec!["inetOrgPerson".to_string()]),
                ("uid", vec!["alice".to_string()]),
                ("objectSid", vec![ALICE_SID.to_string()]),
                ("objectGUID", vec![alice_guid()]),
            ],
        )
        .await;
    seed_user(&directory, "bob").await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    seed_group(&directory, "Staff", &[user_dn("alice"), user_dn("bob")]).await;
    seed_group(&directory, "Sales", &[user_dn("bob")]).await;
    directory
}

fn with_member_kind(kind: &str) -> serde_json::Value {
    let mut config = config_value();
    config["memberIdKind"] = json!(kind);
    config
}

fn filter_for(id: &str) -> ListQuery {
    ListQuery::new().with_filter(format!(r#"members.value eq "{}""#, id))
}

#[tokio::test]
async fn test_member_of_by_dn() {
    init_logging();
    let directory = seeded().await;
    let service = service(&directory);
    let alice = encode_id(&user_dn("alice"));

    let groups = service
        .list_groups(&context(), &filter_for(&alice))
        .await
        .unwrap();

    assert_eq!(
        groups.resources,
        vec![
            json!({
                "id": encode_id(&group_dn("Admins")),
                "displayName": "Admins",
                "members": [{ "value": alice }]
            }),
            json!({
                "id": encode_id(&group_dn("Staff")),
                "displayName": "Staff",
                "members": [{ "value": alice }]
            }),
        ]
    );
}

#[tokio::test]
async fn test_member_of_by_sid() {
    let directory = seeded().await;
    let service = service_with(&directory, with_member_kind("sid"));

    let groups = service
        .list_groups(&context(), &filter_for(ALICE_SID))
        .await
        .unwrap();

    let names: Vec<_> = groups
        .resources
        .iter()
        .filter_map(|g| g["displayName"].as_str())
        .collect();
    assert_eq!(names, vec!["Admins", "Staff"]);
    assert_eq!(groups.resources[0]["members"][0]["value"], encode_id(ALICE_SID));
}

#[tokio::test]
async fn test_member_of_by_guid() {
    let directory = seeded().await;
    let service = service_with(&directory, with_member_kind("guid"));

    let groups = service
        .list_groups(&context(), &filter_for(&encode_id(&alice_guid())))
        .await
        .unwrap();
    assert_eq!(groups.total_results(), 2);
}

#[tokio::test]
async fn test_member_without_groups() {
    let directory = seeded().await;
    seed_user(&directory, "carol").await;
    let service = service(&directory);

    let groups = service
        .list_groups(&context(), &filter_for(&encode_id(&user_dn("carol"))))
        .await
        .unwrap();
    assert_eq!(groups.total_results(), 0);
}

#[tokio::test]
async fn test_unknown_sid_is_not_found() {
    let directory = seeded().await;
    let service = service_with(&directory, with_member_kind("sid"));

    let err = service
        .list_groups(&context(), &filter_for("S-1-5-21-1-2-3-4242"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().starts_with("getGroups error:"));
}

#[tokio::test]
async fn test_invalid_guid_is_rejected() {
    let directory = seeded().await;
    let service = service_with(&directory, with_member_kind("guid"));

    let err = service
        .list_groups(&context(), &filter_for("c2hvcnQ="))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.status(), 400);
}
