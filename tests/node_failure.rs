//! Peer failure tests
//!
//! A dead peer is an address nothing listens on. It never breaks an
//! operation outright; it only withholds its acknowledgment or read response.

mod common;

use common::{closed_addr, start_cluster, ClusterSpec};
use reqwest::StatusCode;

#[tokio::test]
async fn test_quorum_not_met_without_rollback() {
    let dead = closed_addr().await;
    let cluster = start_cluster(ClusterSpec::new(2, 3, 1, 3).leader(0).dead_peer(dead)).await;

    assert_eq!(
        cluster.node(0).put("foo", "bar").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );

    // The leader and the live peer keep the write
    assert_eq!(cluster.node(0).local_read("foo").await.1.unwrap().value, "bar");
    assert_eq!(cluster.node(1).local_read("foo").await.1.unwrap().value, "bar");

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_write_succeeds_when_quorum_reachable() {
    let dead = closed_addr().await;
    let cluster = start_cluster(ClusterSpec::new(2, 3, 1, 2).leader(0).dead_peer(dead)).await;

    assert_eq!(cluster.node(0).put("foo", "bar").await, StatusCode::CREATED);
    assert_eq!(cluster.node(1).get("foo").await.1.unwrap().value, "bar");

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_quorum_read_tolerates_dead_peer() {
    let dead = closed_addr().await;
    let cluster = start_cluster(ClusterSpec::new(2, 3, 3, 3).dead_peer(dead)).await;

    assert_eq!(cluster.node(1).replicate("k", "v", 5).await, StatusCode::OK);

    // Only two replicas can answer R=3; the freshest of them is still served
    let (status, entry) = cluster.node(0).get("k").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry.unwrap().value, "v");

    assert_eq!(cluster.node(0).get("missing").await.0, StatusCode::NOT_FOUND);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_fire_and_forget_ignores_dead_peer() {
    let dead = closed_addr().await;
    let cluster = start_cluster(ClusterSpec::new(2, 3, 1, 1).leader(0).dead_peer(dead)).await;

    assert_eq!(cluster.node(0).put("foo", "bar").await, StatusCode::CREATED);
    assert!(
        cluster
            .wait_converged("foo", "bar", std::time::Duration::from_secs(5))
            .await
    );

    cluster.shutdown().await;
}
