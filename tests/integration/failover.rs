//! Endpoint failover and bind failures.

use crate::common::*;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use scim_ldap_connector::context::{ListQuery, RequestContext};
use scim_ldap_connector::directory::DirectoryError;
use scim_ldap_connector::error::{ErrorKind, INVALID_CREDENTIALS_MESSAGE};
use serde_json::json;

fn refused(url: &str) -> DirectoryError {
    DirectoryError::Refused {
        endpoint: url.to_string(),
        message: "connect ECONNREFUSED".to_string(),
    }
}

#[tokio::test]
async fn test_failover_to_second_endpoint() {
    init_logging();
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    directory.fail_endpoint(DC1, refused(DC1)).await;
    let service = service(&directory);

    let users = service.list_users(&context(), &ListQuery::new()).await.unwrap();
    assert_eq!(users.total_results(), 1);

    let registry = service.executor().connections().registry();
    assert_eq!(registry.active_endpoint(TENANT).await, Some(1));

    // The remembered endpoint is tried first from now on.
    service.list_users(&context(), &ListQuery::new()).await.unwrap();
    assert_eq!(
        directory.stats().await.connect_attempts,
        vec![DC1.to_string(), DC2.to_string(), DC2.to_string()]
    );
}

#[tokio::test]
async fn test_failover_wraps_around() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    let service = service(&directory);

    directory.fail_endpoint(DC1, refused(DC1)).await;
    service.list_users(&context(), &ListQuery::new()).await.unwrap();

    directory.restore_endpoint(DC1).await;
    directory
        .fail_endpoint(
            DC2,
            DirectoryError::Timeout {
                endpoint: DC2.to_string(),
                message: "connection timeout".to_string(),
            },
        )
        .await;
    service.list_users(&context(), &ListQuery::new()).await.unwrap();

    assert_eq!(
        service.executor().connections().registry().active_endpoint(TENANT).await,
        Some(0)
    );
}

#[tokio::test]
async fn test_all_endpoints_down() {
    let directory = directory().await;
    directory.fail_endpoint(DC1, refused(DC1)).await;
    directory.fail_endpoint(DC2, refused(DC2)).await;
    let service = service(&directory);

    let err = service.list_users(&context(), &ListQuery::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.status(), 503);
    assert!(err.is_transient());
    assert!(err.to_string().starts_with("getUsers error:"));
    assert_eq!(directory.stats().await.connect_attempts.len(), 2);
}

#[tokio::test]
async fn test_invalid_credentials() {
    let directory = directory().await;
    let mut config = config_value();
    config["entity"][TENANT]["password"] = json!("wrong");
    let service = service_with(&directory, config);

    let err = service.list_users(&context(), &ListQuery::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.status(), 401);
    assert_eq!(
        err.to_string(),
        format!("getUsers error: {}", INVALID_CREDENTIALS_MESSAGE)
    );
    // Bad credentials are not worth another endpoint.
    assert_eq!(directory.stats().await.connect_attempts, vec![DC1.to_string()]);
}

#[tokio::test]
async fn test_pass_through_authorization() {
    let directory = directory().await;
    directory.add_account("uid=operator,ou=users,dc=example,dc=com", "op-secret").await;
    seed_user(&directory, "alice").await;

    let mut config = config_value();
    config["authPassThroughAllowed"] = json!(true);
    config["entity"][TENANT]["password"] = json!("wrong");
    let service = service_with(&directory, config);

    let header = format!(
        "Basic {}",
        STANDARD.encode("uid=operator,ou=users,dc=example,dc=com:op-secret")
    );
    let context = RequestContext::new(TENANT).with_authorization(header);
    let users = service.list_users(&context, &ListQuery::new()).await.unwrap();
    assert_eq!(users.total_results(), 1);

    // Without a header the configured account is used, and rejected.
    let err = service.list_users(&RequestContext::new(TENANT), &ListQuery::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_sessions_are_released() {
    let directory = directory().await;
    seed_user(&directory, "alice").await;
    let service = service(&directory);

    service.list_users(&context(), &ListQuery::new()).await.unwrap();
    let _ = service
        .delete_user(&context(), "uid%3Dghost%2Cou%3Dusers%2Cdc%3Dexample%2Cdc%3Dcom")
        .await
        .unwrap_err();

    let stats = directory.stats().await;
    assert_eq!(stats.successful_binds, 2);
    assert_eq!(stats.unbinds, 1);
    assert_eq!(stats.destroys, 1);
}
