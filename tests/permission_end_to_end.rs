//! End-to-end permission flows across storage, caching, and resolution

use std::sync::Arc;

use bramble_domain::{EntityKey, EntityType, MemberPermissionRecord, PermissionGroupRecord};
use bramble_permissions::{
    EventContext, EventId, PermissionResolver, PermissionService, UserPermissionChecker,
};
use bramble_storage::PermissionStore;

async fn service() -> Arc<PermissionService> {
    let store = PermissionStore::in_memory().await.unwrap();
    Arc::new(PermissionService::new(Arc::new(store)))
}

#[tokio::test]
async fn test_group_membership_grant_and_revoke() {
    let service = service().await;
    let resolver = PermissionResolver::new(service.clone());

    // u1 has no direct permissions but belongs to "vip", which grants
    // chat.use.
    let mut vip = PermissionGroupRecord::new("vip");
    vip.grant("chat.use").unwrap();
    service.update_permission_group(vip).await.unwrap();

    let mut member = MemberPermissionRecord::new(EntityKey::user("u1"));
    member.join_group("vip");
    service.update_member_permission(member.clone()).await.unwrap();

    let event = EventId::new();
    assert!(resolver.check_user(event, "u1", "chat.use").await.unwrap());
    resolver.expire_event_cache(event);

    // Removing the membership flips the answer for the next event.
    member.leave_group("vip");
    service.update_member_permission(member).await.unwrap();

    let event = EventId::new();
    assert!(!resolver.check_user(event, "u1", "chat.use").await.unwrap());
}

#[tokio::test]
async fn test_default_deny_for_unseen_entity() {
    let service = service().await;
    let resolver = PermissionResolver::new(service.clone());

    let event = EventId::new();
    for node in ["chat.use", "chat.admin.exec", "anything.at.all"] {
        assert!(!resolver.check_user(event, "nobody", node).await.unwrap());
    }

    // The check itself created the backing row, exactly once.
    let record = service
        .get_member_permission("nobody", EntityType::User, true)
        .await
        .unwrap();
    assert!(record.permissions.is_empty());
    assert!(record.permission_groups.is_empty());
}

#[tokio::test]
async fn test_group_update_is_coherent_for_readers() {
    let service = service().await;

    // A reader holds the old snapshot in cache.
    let before = service.get_permission_group("vip", false).await.unwrap();
    assert!(before.permissions.is_empty());

    let mut vip = PermissionGroupRecord::new("vip");
    vip.grant("chat.use").unwrap();
    service.update_permission_group(vip.clone()).await.unwrap();

    // No stale read after the update commits.
    let after = service.get_permission_group("vip", false).await.unwrap();
    assert_eq!(after, vip);
}

#[tokio::test]
async fn test_concurrent_first_checks_share_one_row() {
    let service = service().await;
    let resolver = Arc::new(PermissionResolver::new(service.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            let ctx = EventContext::direct("fresh-user");
            let verdict = UserPermissionChecker::new("chat.use")
                .passes(&resolver, &ctx)
                .await;
            resolver.expire_event_cache(ctx.event_id);
            verdict
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap());
    }

    // Eight concurrent get-or-creates raced; one row exists.
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM member_permission WHERE any_id = 'fresh-user'",
    )
    .fetch_one(service.store().pool())
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_refresh_distinguishes_missing_from_empty() {
    let service = service().await;

    // get-or-create produces an empty record...
    service
        .get_member_permission("u1", EntityType::User, false)
        .await
        .unwrap();
    assert!(service
        .refresh_member_permission("u1", EntityType::User)
        .await
        .is_ok());

    // ...but refresh refuses to fabricate one.
    assert!(service
        .refresh_member_permission("u2", EntityType::User)
        .await
        .is_err());
}

#[tokio::test]
async fn test_store_outage_is_an_error_not_a_denial() {
    let service = service().await;
    let resolver = PermissionResolver::new(service.clone());

    // Warm path works.
    let event = EventId::new();
    assert!(!resolver.check_user(event, "u1", "chat.use").await.unwrap());
    resolver.expire_event_cache(event);

    service.store().pool().close().await;

    // A cold lookup against the dead store must surface the failure.
    let event = EventId::new();
    let err = resolver
        .check_user(event, "other-user", "chat.use")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
