//! Group provisioning through the service boundary.

use crate::common::*;
use scim_ldap_connector::context::ListQuery;
use scim_ldap_connector::error::ErrorKind;
use scim_ldap_connector::membership::encode_id;
use serde_json::{Value, json};

fn member(uid: &str) -> Value {
    json!({ "value": encode_id(&user_dn(uid)) })
}

fn removal(uid: &str) -> Value {
    json!({ "value": encode_id(&user_dn(uid)), "operation": "delete" })
}

async fn members_of(directory: &scim_ldap_connector::InMemoryDirectory, cn: &str) -> Vec<String> {
    directory
        .entry(&group_dn(cn))
        .await
        .map(|entry| entry.attributes.get("member").cloned().unwrap_or_default())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_create_group_with_members() {
    init_logging();
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    let service = service(&directory);

    let id = service
        .create_group(
            &context(),
            &json!({
                "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
                "displayName": "Admins",
                "externalId": "ext-1",
                "members": [{ "value": encode_id(&user_dn("alice")), "display": "Alice" }]
            }),
        )
        .await
        .unwrap();

    assert_eq!(id, encode_id(&group_dn("Admins")));
    assert_eq!(members_of(&directory, "Admins").await, vec![user_dn("alice")]);

    let entry = directory.entry(&group_dn("Admins")).await.unwrap();
    assert_eq!(entry.attributes["businessCategory"], vec!["ext-1".to_string()]);
    assert_eq!(entry.attributes["objectClass"], vec!["groupOfNames".to_string()]);
}

#[tokio::test]
async fn test_create_group_without_members_writes_placeholder() {
    let directory = directory().await;
    let service = service(&directory);

    service
        .create_group(&context(), &json!({"displayName": "Empty", "members": []}))
        .await
        .unwrap();
    assert_eq!(members_of(&directory, "Empty").await, vec![String::new()]);

    let groups = service
        .list_groups(&context(), &ListQuery::new().with_filter(r#"displayName eq "Empty""#))
        .await
        .unwrap();
    assert_eq!(groups.total_results(), 1);
    assert_eq!(groups.resources[0]["displayName"], "Empty");
    assert!(groups.resources[0].get("members").is_none());
}

#[tokio::test]
async fn test_list_all_groups_requires_display_name() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    seed_group(&directory, "Staff", &[]).await;
    directory
        .insert_entry(
            &group_dn("Nameless"),
            [("objectClass", vec!["groupOfNames"]), ("member", vec![""])],
        )
        .await;
    let service = service(&directory);

    let groups = service.list_groups(&context(), &ListQuery::new()).await.unwrap();

    let names: Vec<_> = groups
        .resources
        .iter()
        .filter_map(|g| g["displayName"].as_str())
        .collect();
    assert_eq!(names, vec!["Admins", "Staff"]);
    assert_eq!(
        groups.resources[0]["members"],
        json!([{ "value": encode_id(&user_dn("alice")) }])
    );
    assert_eq!(groups.resources[0]["id"], encode_id(&group_dn("Admins")));
}

#[tokio::test]
async fn test_group_lookups() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    seed_group(&directory, "Staff", &[]).await;
    directory
        .insert_entry(
            &group_dn("Sales"),
            [
                ("objectClass", vec!["groupOfNames"]),
                ("cn", vec!["Sales"]),
                ("member", vec![""]),
                ("businessCategory", vec!["ext-42"]),
            ],
        )
        .await;
    let service = service(&directory);

    let filters = [
        format!(r#"id eq "{}""#, encode_id(&group_dn("Staff"))),
        r#"displayName eq "Staff""#.to_string(),
        r#"externalId eq "ext-42""#.to_string(),
    ];
    let expected = ["Staff", "Staff", "Sales"];

    for (filter, name) in filters.iter().zip(expected) {
        let groups = service
            .list_groups(&context(), &ListQuery::new().with_filter(filter.as_str()))
            .await
            .unwrap();
        assert_eq!(groups.total_results(), 1, "filter {}", filter);
        assert_eq!(groups.resources[0]["displayName"], name);
    }
}

#[tokio::test]
async fn test_unsupported_group_filters() {
    let directory = directory().await;
    let service = service(&directory);

    let cases = [
        (
            r#"members.display eq "Alice""#,
            r#"getGroups error: not supporting simpel filtering: members.display eq "Alice""#,
        ),
        (
            r#"displayName co "Adm""#,
            r#"getGroups error: not supporting simpel filtering: displayName co "Adm""#,
        ),
        (
            r#"displayName eq "a" or displayName eq "b""#,
            r#"getGroups error: not supporting advanced filtering: displayName eq "a" or displayName eq "b""#,
        ),
    ];

    for (filter, message) in cases {
        let err = service
            .list_groups(&context(), &ListQuery::new().with_filter(filter))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.to_string(), message);
    }
}

#[tokio::test]
async fn test_member_updates() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    let service = service(&directory);
    let id = encode_id(&group_dn("Admins"));

    service
        .modify_group(&context(), &id, &json!({"members": [member("bob"), member("carol")]}))
        .await
        .unwrap();
    assert_eq!(
        members_of(&directory, "Admins").await,
        vec![user_dn("alice"), user_dn("bob"), user_dn("carol")]
    );

    // Re-adding an existing member alongside a new one.
    service
        .modify_group(&context(), &id, &json!({"members": [member("alice"), member("dave")]}))
        .await
        .unwrap();
    assert_eq!(members_of(&directory, "Admins").await.len(), 4);

    service
        .modify_group(&context(), &id, &json!({"members": [removal("bob"), removal("dave")]}))
        .await
        .unwrap();
    assert_eq!(
        members_of(&directory, "Admins").await,
        vec![user_dn("alice"), user_dn("carol")]
    );
}

#[tokio::test]
async fn test_removing_last_members_leaves_placeholder() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice"), user_dn("bob")]).await;
    let service = service(&directory);

    service
        .modify_group(
            &context(),
            &encode_id(&group_dn("Admins")),
            &json!({"members": [removal("alice"), removal("bob")]}),
        )
        .await
        .unwrap();

    assert_eq!(members_of(&directory, "Admins").await, vec![String::new()]);
}

#[tokio::test]
async fn test_additions_apply_before_removals() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    let service = service(&directory);

    service
        .modify_group(
            &context(),
            &encode_id(&group_dn("Admins")),
            &json!({"members": [removal("erin"), member("erin")]}),
        )
        .await
        .unwrap();

    assert_eq!(members_of(&directory, "Admins").await, vec![user_dn("alice")]);
}

#[tokio::test]
async fn test_modify_group_only_accepts_members() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    let service = service(&directory);
    let id = encode_id(&group_dn("Admins"));

    let err = service
        .modify_group(&context(), &id, &json!({"displayName": "Root"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(
        err.to_string(),
        "modifyGroup error: only supports modification of members"
    );

    let err = service
        .modify_group(&context(), &id, &json!({"members": {"value": "x"}}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(err.to_string().contains("correct syntax is"));
}

#[tokio::test]
async fn test_delete_group() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    let service = service(&directory);

    service
        .delete_group(&context(), &encode_id(&group_dn("Admins")))
        .await
        .unwrap();
    assert!(directory.entry(&group_dn("Admins")).await.is_none());
}

#[test]
fn test_groups_disabled_without_group_map() {
    let mut config = config_value();
    config["map"]
        .as_object_mut()
        .expect("map is an object")
        .remove("group");

    tokio_test::block_on(async {
        let directory = directory().await;
        seed_group(&directory, "Admins", &[user_dn("alice")]).await;
        let service = service_with(&directory, config);

        let groups = service.list_groups(&context(), &ListQuery::new()).await.unwrap();
        assert_eq!(groups.total_results(), 0);

        let err = service
            .create_group(&context(), &json!({"displayName": "New"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "createGroup error: missing configuration endpoint.map.group"
        );
    });
}

#[tokio::test]
async fn test_groups_disabled_without_group_base() {
    let directory = directory().await;
    seed_group(&directory, "Admins", &[user_dn("alice")]).await;
    let mut config = config_value();
    config["entity"][TENANT]["ldap"]
        .as_object_mut()
        .expect("ldap settings are an object")
        .remove("groupBase");
    let service = service_with(&directory, config);

    let groups = service.list_groups(&context(), &ListQuery::new()).await.unwrap();
    assert_eq!(groups.total_results(), 0);
    assert!(directory.stats().await.connect_attempts.is_empty());
}

#[tokio::test]
async fn test_create_decodes_members_without_dn_rule() {
    let directory = directory().await;
    let mut config = config_value();
    config["map"]["group"]["member"] = json!({ "mapTo": "members.value", "type": "array" });
    let service = service_with(&directory, config);

    service
        .create_group(
            &context(),
            &json!({
                "displayName": "Admins",
                "members": [member("alice"), member("bob")]
            }),
        )
        .await
        .unwrap();

    assert_eq!(
        members_of(&directory, "Admins").await,
        vec![user_dn("alice"), user_dn("bob")]
    );
}
