//! Exhaustive paged listing.

use crate::common::*;
use scim_ldap_connector::context::ListQuery;
use serde_json::json;

async fn seed_many(directory: &scim_ldap_connector::InMemoryDirectory, count: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let uid = format!("user{:04}", i);
        seed_user(directory, &uid).await;
        names.push(uid);
    }
    names
}

#[tokio::test]
async fn test_listing_follows_every_page() {
    init_logging();
    let directory = directory().await;
    let expected = seed_many(&directory, 450).await;
    let service = service(&directory);

    let users = service
        .list_users(&context(), &ListQuery::new().with_attributes(["userName"]))
        .await
        .unwrap();

    let names: Vec<_> = users
        .resources
        .iter()
        .filter_map(|u| u["userName"].as_str().map(str::to_string))
        .collect();
    assert_eq!(names, expected);

    let stats = directory.stats().await;
    assert_eq!(stats.page_requests, 3);
    assert_eq!(stats.unbinds, 1);
}

#[tokio::test]
async fn test_configured_page_size() {
    let directory = directory().await;
    seed_many(&directory, 25).await;
    let mut config = config_value();
    config["pageSize"] = json!(10);
    let service = service_with(&directory, config);

    let users = service.list_users(&context(), &ListQuery::new()).await.unwrap();

    assert_eq!(users.total_results(), 25);
    assert_eq!(directory.stats().await.page_requests, 3);
}

#[tokio::test]
async fn test_exact_multiple_of_page_size() {
    let directory = directory().await;
    seed_many(&directory, 20).await;
    let mut config = config_value();
    config["pageSize"] = json!(10);
    let service = service_with(&directory, config);

    let users = service.list_users(&context(), &ListQuery::new()).await.unwrap();

    assert_eq!(users.total_results(), 20);
    assert_eq!(directory.stats().await.page_requests, 2);
}

#[tokio::test]
async fn test_empty_container_is_single_page() {
    let directory = directory().await;
    let service = service(&directory);

    let users = service.list_users(&context(), &ListQuery::new()).await.unwrap();

    assert_eq!(users.total_results(), 0);
    assert_eq!(directory.stats().await.page_requests, 1);
}

#[tokio::test]
async fn test_concurrent_listings_are_independent() {
    let directory = directory().await;
    seed_many(&directory, 30).await;
    let mut config = config_value();
    config["pageSize"] = json!(7);
    let service = service_with(&directory, config);
    let context = context();
    let query = ListQuery::new();

    let results = futures::future::join_all(
        (0..4).map(|_| service.list_users(&context, &query)),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap().total_results(), 30);
    }
    // ceil(30 / 7) pages per listing
    assert_eq!(directory.stats().await.page_requests, 4 * 5);
}
