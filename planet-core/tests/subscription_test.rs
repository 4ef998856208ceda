//! SubscriptionSync integration tests

mod common;

use chrono::{TimeZone, Utc};
use common::MockNode;
use planet_core::{PlanetStore, PublicArticle, PublicPlanet, RootLayout, SubscriptionSync, UpdateOutcome};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

const LINK: &str = "k51remote";

fn manifest(titles: &[(&str, &str)]) -> Vec<u8> {
    let planet = PublicPlanet {
        name: "Remote".into(),
        about: "elsewhere".into(),
        ipns: LINK.into(),
        created: Utc.timestamp_opt(1_000, 0).unwrap(),
        updated: Utc.timestamp_opt(2_000, 0).unwrap(),
        articles: titles
            .iter()
            .enumerate()
            .map(|(i, (link, title))| PublicArticle {
                link: link.to_string(),
                title: title.to_string(),
                content: String::new(),
                created: Utc.timestamp_opt(1_000 + i as i64, 0).unwrap(),
            })
            .collect(),
    };
    serde_json::to_vec(&planet).unwrap()
}

fn setup(tmp: &TempDir) -> (Arc<MockNode>, Arc<PlanetStore>, SubscriptionSync) {
    let node = Arc::new(MockNode::new());
    let store = Arc::new(PlanetStore::new(RootLayout::new(tmp.path())));
    let sync = SubscriptionSync::new(node.clone(), store.clone());
    (node, store, sync)
}

#[tokio::test]
async fn test_follow_fetches_manifest() {
    let tmp = TempDir::new().unwrap();
    let (node, store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A"), ("b", "B")]));

    let handle = sync.follow(LINK).await.unwrap();
    let planet = handle.planet().read().await;
    assert_eq!(planet.name, "Remote");
    assert_eq!(planet.cid.as_deref(), Some("bafy1"));
    assert_eq!(planet.articles.len(), 2);
    assert_eq!(planet.unread_count(), 2);
    drop(planet);

    let reopened = PlanetStore::open(RootLayout::new(tmp.path())).await.unwrap();
    assert_eq!(reopened.following_planets().await.len(), 1);
    assert_eq!(store.following_planets().await.len(), 1);
}

#[tokio::test]
async fn test_failed_follow_keeps_nothing() {
    let tmp = TempDir::new().unwrap();
    let (_node, store, sync) = setup(&tmp);
    assert!(sync.follow(LINK).await.is_err());
    assert!(store.following_planets().await.is_empty());
    let reopened = PlanetStore::open(RootLayout::new(tmp.path())).await.unwrap();
    assert!(reopened.following_planets().await.is_empty());
}

#[tokio::test]
async fn test_same_cid_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let (node, _store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A")]));
    let handle = sync.follow(LINK).await.unwrap();
    let info = handle.layout().info_path();
    let before = std::fs::read(&info).unwrap();
    let fetches = node.fetch_calls.load(Ordering::SeqCst);

    let outcome = sync.update(&handle).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged { cid: "bafy1".into() });
    assert_eq!(node.fetch_calls.load(Ordering::SeqCst), fetches);
    assert_eq!(std::fs::read(&info).unwrap(), before);
}

#[tokio::test]
async fn test_update_preserves_read_and_starred() {
    let tmp = TempDir::new().unwrap();
    let (node, _store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A")]));
    let handle = sync.follow(LINK).await.unwrap();
    let id = handle.planet().read().await.articles[0].id;
    handle.set_read(id, true).await.unwrap();
    handle.set_starred(id, true).await.unwrap();

    node.point(LINK, "bafy2");
    node.serve("bafy2", "planet.json", manifest(&[("a", "A edited"), ("c", "C")]));
    let outcome = sync.update(&handle).await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated { cid: "bafy2".into(), added: 1, refreshed: 1 }
    );

    let reopened = PlanetStore::open(RootLayout::new(tmp.path())).await.unwrap();
    let planet = reopened.following_planet(handle.id()).await.unwrap();
    let planet = planet.planet().read().await;
    let known = planet.article(id).unwrap();
    assert_eq!(known.title, "A edited");
    assert!(known.read.is_some());
    assert!(known.starred.is_some());
    assert_eq!(planet.articles.len(), 2);
}

#[tokio::test]
async fn test_update_all_swallows_failures() {
    let tmp = TempDir::new().unwrap();
    let (node, store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A")]));
    node.point("k51other", "bafy9");
    node.serve("bafy9", "planet.json", manifest(&[]));
    sync.follow(LINK).await.unwrap();
    sync.follow("k51other").await.unwrap();

    node.point(LINK, "bafy2");
    node.serve("bafy2", "planet.json", manifest(&[("a", "A"), ("b", "B")]));
    node.point("k51other", "bafy-missing");

    assert_eq!(sync.update_all().await, 1);
    assert_eq!(store.following_planets().await.len(), 2);
}

#[tokio::test]
async fn test_failed_write_keeps_update_pending() {
    let tmp = TempDir::new().unwrap();
    let (node, _store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A")]));
    let handle = sync.follow(LINK).await.unwrap();

    // Put a plain file where the articles directory lives so the write fails.
    let articles = handle.layout().articles_dir();
    let parked = tmp.path().join("articles-parked");
    std::fs::rename(&articles, &parked).unwrap();
    std::fs::write(&articles, b"not a directory").unwrap();

    node.point(LINK, "bafy2");
    node.serve("bafy2", "planet.json", manifest(&[("a", "A"), ("b", "B")]));
    assert!(sync.update(&handle).await.is_err());
    {
        let planet = handle.planet().read().await;
        assert_eq!(planet.cid.as_deref(), Some("bafy1"));
        assert_eq!(planet.articles.len(), 1);
    }

    std::fs::remove_file(&articles).unwrap();
    std::fs::rename(&parked, &articles).unwrap();
    let outcome = sync.update(&handle).await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated { cid: "bafy2".into(), added: 1, refreshed: 0 }
    );

    let reopened = PlanetStore::open(RootLayout::new(tmp.path())).await.unwrap();
    let planet = reopened.following_planet(handle.id()).await.unwrap();
    let planet = planet.planet().read().await;
    assert_eq!(planet.cid.as_deref(), Some("bafy2"));
    assert_eq!(planet.articles.len(), 2);
}

#[tokio::test]
async fn test_concurrent_update_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (node, store, sync) = setup(&tmp);
    node.point(LINK, "bafy1");
    node.serve("bafy1", "planet.json", manifest(&[("a", "A")]));
    let handle = sync.follow(LINK).await.unwrap();

    let gated = Arc::new(MockNode::gated_resolve());
    gated.point(LINK, "bafy2");
    gated.serve("bafy2", "planet.json", manifest(&[("a", "A"), ("b", "B")]));
    let gated_sync = Arc::new(SubscriptionSync::new(gated.clone(), store.clone()));

    let running = {
        let gated_sync = gated_sync.clone();
        let handle = handle.clone();
        tokio::spawn(async move { gated_sync.update(&handle).await })
    };
    gated.wait_entered().await;
    assert!(handle.is_updating());

    let rejected = gated_sync.update(&handle).await.unwrap_err();
    assert!(rejected.is_busy());
    assert_eq!(gated.resolve_calls.load(Ordering::SeqCst), 1);

    gated.release();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated { cid: "bafy2".into(), added: 1, refreshed: 0 }
    );
    assert!(!handle.is_updating());
    assert_eq!(gated.resolve_calls.load(Ordering::SeqCst), 1);
}
