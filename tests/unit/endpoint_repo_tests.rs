//! Unit tests for `EndpointRepo` registration and identity updates.

use std::sync::Arc;

use noise_generator::models::endpoint::{EndpointAddress, IdentityField};
use noise_generator::persistence::{db, endpoint_repo::EndpointRepo};
use noise_generator::AppError;

async fn repo() -> EndpointRepo {
    let db = db::connect_memory().await.expect("db");
    EndpointRepo::new(Arc::new(db))
}

fn address(raw: &str) -> EndpointAddress {
    raw.parse().expect("addr")
}

#[tokio::test]
async fn upsert_creates_stub_record() {
    let repo = repo().await;
    let addr = address("10.0.0.5:4444");

    repo.upsert(&addr).await.expect("upsert");

    let record = repo.get(&addr).await.expect("get").expect("record");
    assert_eq!(record.address, addr);
    assert!(record.uname.is_none());
    assert!(record.user.is_none());
    assert!(record.nickname.is_none());
    assert_eq!(record.first_seen, record.last_seen);
}

#[tokio::test]
async fn upsert_is_idempotent_and_keeps_resolved_fields() {
    let repo = repo().await;
    let addr = address("10.0.0.5:4444");

    repo.upsert(&addr).await.expect("upsert");
    repo.update_field(&addr, IdentityField::User, "root")
        .await
        .expect("update");
    let before = repo.get(&addr).await.expect("get").expect("record");

    repo.upsert(&addr).await.expect("second upsert");

    let records = repo.list().await.expect("list");
    assert_eq!(records.len(), 1);
    let after = &records[0];
    assert_eq!(after.user.as_deref(), Some("root"));
    assert_eq!(after.first_seen, before.first_seen);
    assert!(after.last_seen >= before.last_seen);
}

#[tokio::test]
async fn update_field_writes_only_that_field() {
    let repo = repo().await;
    let addr = address("10.0.0.5:4444");
    repo.upsert(&addr).await.expect("upsert");

    repo.update_field(&addr, IdentityField::Uname, "Linux box1 5.15")
        .await
        .expect("uname");
    repo.update_field(&addr, IdentityField::Nickname, "web-1")
        .await
        .expect("nickname");

    let record = repo.get(&addr).await.expect("get").expect("record");
    assert_eq!(record.uname.as_deref(), Some("Linux box1 5.15"));
    assert_eq!(record.nickname.as_deref(), Some("web-1"));
    assert!(record.user.is_none());
}

#[tokio::test]
async fn update_field_overwrites_previous_value() {
    let repo = repo().await;
    let addr = address("10.0.0.5:4444");
    repo.upsert(&addr).await.expect("upsert");

    repo.update_field(&addr, IdentityField::User, "www-data")
        .await
        .expect("first");
    repo.update_field(&addr, IdentityField::User, "root")
        .await
        .expect("second");

    let record = repo.get(&addr).await.expect("get").expect("record");
    assert_eq!(record.user.as_deref(), Some("root"));
}

#[tokio::test]
async fn update_field_on_unknown_address_is_not_found() {
    let repo = repo().await;

    let err = repo
        .update_field(&address("10.0.0.9:1"), IdentityField::User, "root")
        .await
        .expect_err("missing");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn get_returns_none_for_unknown_address() {
    let repo = repo().await;
    assert!(repo.get(&address("10.0.0.9:1")).await.expect("get").is_none());
}

#[tokio::test]
async fn same_ip_different_ports_are_separate_records() {
    let repo = repo().await;
    let a = address("10.0.0.5:4444");
    let b = address("10.0.0.5:4445");

    repo.upsert(&a).await.expect("a");
    repo.upsert(&b).await.expect("b");
    repo.update_field(&b, IdentityField::User, "alice")
        .await
        .expect("update");

    let records = repo.list().await.expect("list");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].address, a);
    assert!(records[0].user.is_none());
    assert_eq!(records[1].address, b);
    assert_eq!(records[1].user.as_deref(), Some("alice"));
}

#[tokio::test]
async fn ipv6_addresses_round_trip() {
    let repo = repo().await;
    let addr = address("[fe80::1]:9000");

    repo.upsert(&addr).await.expect("upsert");
    let record = repo.get(&addr).await.expect("get").expect("record");
    assert_eq!(record.address, addr);
}
