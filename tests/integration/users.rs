//! User provisioning through the service boundary.

use crate::common::*;
use scim_ldap_connector::context::ListQuery;
use scim_ldap_connector::error::ErrorKind;
use scim_ldap_connector::membership::encode_id;
use serde_json::json;

fn barbara() -> serde_json::Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "userName": "bjensen",
        "displayName": "Barbara Jensen",
        "name": { "givenName": "Barbara", "familyName": "Jensen" },
        "emails": [{ "value": "bjensen@example.com", "type": "work", "primary": true }],
        "active": true,
        "password": "hunter2",
        "groups": []
    })
}

#[tokio::test]
async fn test_create_then_list_round_trip() {
    init_logging();
    let directory = directory().await;
    let service = service(&directory);
    let context = context();

    let id = service.create_user(&context, &barbara()).await.unwrap();
    assert_eq!(id, encode_id(&user_dn("bjensen")));

    let users = service
        .list_users(&context, &ListQuery::new().with_filter(r#"userName eq "bjensen""#))
        .await
        .unwrap();
    assert_eq!(users.total_results(), 1);

    let user = &users.resources[0];
    assert_eq!(user["id"], id);
    assert_eq!(user["userName"], "bjensen");
    assert_eq!(user["displayName"], "Barbara Jensen");
    assert_eq!(user["name"]["givenName"], "Barbara");
    assert_eq!(user["name"]["familyName"], "Jensen");
    assert_eq!(user["emails"][0]["value"], "bjensen@example.com");
    assert_eq!(user["active"], true);
    assert_eq!(user["groups"], json!([]));
    assert!(user.get("password").is_none());

    let entry = directory.entry(&user_dn("bjensen")).await.unwrap();
    assert_eq!(entry.attributes["objectClass"], vec!["inetOrgPerson".to_string()]);
    assert_eq!(entry.attributes["employeeActive"], vec!["TRUE".to_string()]);
    assert_eq!(entry.attributes["userPassword"], vec!["hunter2".to_string()]);
}

#[tokio::test]
async fn test_create_existing_user_is_conflict() {
    let directory = directory().await;
    let service = service(&directory);
    let context = context();

    service.create_user(&context, &barbara()).await.unwrap();
    let err = service.create_user(&context, &barbara()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.status(), 409);
    assert!(err.to_string().starts_with("createUser error: ENTRY_EXISTS"));
}

#[tokio::test]
async fn test_create_with_unmapped_attribute_is_rejected() {
    let directory = directory().await;
    let service = service(&directory);

    let err = service
        .create_user(&context(), &json!({"userName": "x", "nickName": "Babs"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Translation);
    assert_eq!(err.status(), 400);
    assert!(err.to_string().contains("nickName"));
    assert!(directory.entry(&user_dn("x")).await.is_none());
}

#[tokio::test]
async fn test_create_in_overridden_container() {
    let directory = directory().await;
    let service = service(&directory);
    let contractor = "uid=contractor1,ou=contractors,dc=example,dc=com";

    let id = service
        .create_user(
            &context(),
            &json!({
                "userName": "contractor1",
                "name": { "familyName": "Hired" },
                "entitlements": [{ "type": "userbase", "value": "ou=contractors,dc=example,dc=com" }]
            }),
        )
        .await
        .unwrap();

    assert_eq!(id, encode_id(contractor));
    let entry = directory.entry(contractor).await.unwrap();
    assert!(!entry.attributes.keys().any(|k| k.eq_ignore_ascii_case("entitlements")));
    assert!(directory.entry(&user_dn("contractor1")).await.is_none());
}

#[tokio::test]
async fn test_lookup_by_id() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    seed_user(&directory, "bob").await;
    let service = service(&directory);

    let filter = format!(r#"id eq "{}""#, encode_id(&user_dn("bob")));
    let users = service
        .list_users(&context(), &ListQuery::new().with_filter(filter))
        .await
        .unwrap();

    assert_eq!(users.total_results(), 1);
    assert_eq!(users.resources[0]["userName"], "bob");
}

#[tokio::test]
async fn test_lookup_of_missing_id_is_empty() {
    let directory = directory().await;
    let service = service(&directory);

    let filter = format!(r#"id eq "{}""#, encode_id(&user_dn("ghost")));
    let users = service
        .list_users(&context(), &ListQuery::new().with_filter(filter))
        .await
        .unwrap();
    assert_eq!(users.total_results(), 0);
}

#[tokio::test]
async fn test_list_without_filter_returns_every_user() {
    let directory = directory().await;
    for uid in ["alice", "bob", "carol"] {
        seed_user(&directory, uid).await;
    }
    let service = service(&directory);

    let users = service
        .list_users(&context(), &ListQuery::new().with_attributes(["userName"]))
        .await
        .unwrap();

    let names: Vec<_> = users
        .resources
        .iter()
        .filter_map(|u| u["userName"].as_str())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert!(users.resources.iter().all(|u| u["groups"] == json!([])));
}

#[tokio::test]
async fn test_static_user_filter_applies() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    directory
        .insert_entry(
            &user_dn("mallory"),
            [
                ("objectClass", vec!["inetOrgPerson"]),
                ("uid", vec!["mallory"]),
                ("employeeType", vec!["disabled"]),
            ],
        )
        .await;

    let mut config = config_value();
    config["entity"][TENANT]["ldap"]["userFilter"] = json!("(!(employeeType=disabled))");
    let service = service_with(&directory, config);

    let users = service.list_users(&context(), &ListQuery::new()).await.unwrap();
    assert_eq!(users.total_results(), 1);
    assert_eq!(users.resources[0]["userName"], "alice");
}

#[tokio::test]
async fn test_modify_replaces_given_attributes() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    let service = service(&directory);
    let id = encode_id(&user_dn("alice"));

    service
        .modify_user(
            &context(),
            &id,
            &json!({"name": {"familyName": "Liddell"}, "displayName": null}),
        )
        .await
        .unwrap();

    let entry = directory.entry(&user_dn("alice")).await.unwrap();
    assert_eq!(entry.attributes["sn"], vec!["Liddell".to_string()]);
    assert!(!entry.attributes.contains_key("cn"));
}

#[tokio::test]
async fn test_empty_modify_is_a_no_op() {
    let directory = directory().await;
    let service = service(&directory);
    let id = encode_id(&user_dn("alice"));

    service.modify_user(&context(), &id, &json!({})).await.unwrap();
    service
        .modify_user(&context(), &id, &json!({"groups": [{"value": "x"}]}))
        .await
        .unwrap();

    assert!(directory.stats().await.connect_attempts.is_empty());
}

#[tokio::test]
async fn test_delete_user() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    let service = service(&directory);
    let id = encode_id(&user_dn("alice"));

    service.delete_user(&context(), &id).await.unwrap();
    assert!(directory.entry(&user_dn("alice")).await.is_none());

    let err = service.delete_user(&context(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status(), 404);
    assert!(err.to_string().starts_with("deleteUser error: NO_OBJECT"));
}

#[tokio::test]
async fn test_unsupported_filters_fail_fast() {
    let directory = directory().await;
    let service = service(&directory);

    let cases = [
        (
            r#"userName eq "a" and active eq true"#,
            r#"getUsers error: not supporting advanced filtering: userName eq "a" and active eq true"#,
        ),
        (
            r#"userName sw "b""#,
            r#"getUsers error: not supporting simpel filtering: userName sw "b""#,
        ),
        (
            r#"groups.value eq "cn=Admins""#,
            r#"getUsers error: not supporting groups member of user filtering: groups.value eq "cn=Admins""#,
        ),
    ];

    for (filter, message) in cases {
        let err = service
            .list_users(&context(), &ListQuery::new().with_filter(filter))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_string(), message);
    }

    assert!(directory.stats().await.connect_attempts.is_empty());
}

#[tokio::test]
async fn test_filter_on_unmapped_attribute_is_translation_error() {
    let directory = directory().await;
    let service = service(&directory);

    let err = service
        .list_users(&context(), &ListQuery::new().with_filter(r#"nickName eq "Babs""#))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Translation);
}

#[tokio::test]
async fn test_unknown_tenant_is_configuration_error() {
    let directory = directory().await;
    let service = service(&directory);

    let err = service
        .list_users(
            &scim_ldap_connector::context::RequestContext::new("other"),
            &ListQuery::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.status(), 500);
}
