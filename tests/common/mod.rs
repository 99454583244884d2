//! In-process cluster harness for the integration tests

#![allow(dead_code)]

use quorumkv::common::{NodeConfig, NodeRole};
use quorumkv::{Entry, Node};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Cluster shape shared by every node
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub nodes: usize,
    /// Index of the leader; `None` runs every node as a peer
    pub leader: Option<usize>,
    pub n: usize,
    pub r: usize,
    pub w: usize,
    pub write_delay_ms: u64,
    pub read_delay_ms: u64,
    /// Addresses added to every node's peer list that nothing serves
    pub dead_peers: Vec<String>,
}

impl ClusterSpec {
    pub fn new(nodes: usize, n: usize, r: usize, w: usize) -> Self {
        Self {
            nodes,
            leader: None,
            n,
            r,
            w,
            write_delay_ms: 0,
            read_delay_ms: 0,
            dead_peers: Vec::new(),
        }
    }

    pub fn leader(mut self, index: usize) -> Self {
        self.leader = Some(index);
        self
    }

    pub fn delays(mut self, write_ms: u64, read_ms: u64) -> Self {
        self.write_delay_ms = write_ms;
        self.read_delay_ms = read_ms;
        self
    }

    pub fn dead_peer(mut self, addr: String) -> Self {
        self.dead_peers.push(addr);
        self
    }
}

pub struct TestNode {
    pub addr: SocketAddr,
    pub url: String,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<quorumkv::Result<()>>>,
}

pub struct TestCluster {
    pub nodes: Vec<TestNode>,
}

/// An address nothing listens on
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub async fn start_cluster(spec: ClusterSpec) -> TestCluster {
    let mut listeners = Vec::new();
    for _ in 0..spec.nodes {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let addrs: Vec<SocketAddr> = listeners.iter().map(|l| l.local_addr().unwrap()).collect();

    let mut nodes = Vec::new();
    for (i, listener) in listeners.into_iter().enumerate() {
        let mut peers: Vec<String> = addrs
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, a)| a.to_string())
            .collect();
        peers.extend(spec.dead_peers.iter().cloned());

        let config = NodeConfig {
            bind_addr: addrs[i],
            role: if spec.leader == Some(i) {
                NodeRole::Leader
            } else {
                NodeRole::Peer
            },
            peers,
            n: spec.n,
            r: spec.r,
            w: spec.w,
            write_delay_ms: spec.write_delay_ms,
            read_delay_ms: spec.read_delay_ms,
            peer_timeout_ms: Some(5_000),
            ..Default::default()
        };

        let node = Node::new(config).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(node.serve_on(listener, async {
            let _ = rx.await;
        }));

        nodes.push(TestNode {
            addr: addrs[i],
            url: format!("http://{}", addrs[i]),
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle: Some(handle),
        });
    }

    TestCluster { nodes }
}

impl TestCluster {
    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub async fn shutdown(mut self) {
        for node in &mut self.nodes {
            if let Some(tx) = node.shutdown.take() {
                let _ = tx.send(());
            }
        }
        for node in &mut self.nodes {
            if let Some(handle) = node.handle.take() {
                handle.await.unwrap().unwrap();
            }
        }
    }

    /// Poll every node's local state until all hold `value` or the deadline passes.
    pub async fn wait_converged(&self, key: &str, value: &str, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            let mut converged = true;
            for node in &self.nodes {
                match node.local_read(key).await {
                    (StatusCode::OK, Some(entry)) if entry.value == value => {}
                    _ => converged = false,
                }
            }
            if converged {
                return true;
            }
            if start.elapsed() > deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl TestNode {
    pub async fn put(&self, key: &str, value: &str) -> StatusCode {
        self.client
            .post(format!("{}/put", self.url))
            .query(&[("key", key), ("value", value)])
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn read_entry(&self, path: &str, key: &str) -> (StatusCode, Option<Entry>) {
        let resp = self
            .client
            .get(format!("{}{}", self.url, path))
            .query(&[("key", key)])
            .send()
            .await
            .unwrap();
        let status = resp.status();
        if status == StatusCode::OK {
            (status, Some(resp.json().await.unwrap()))
        } else {
            (status, None)
        }
    }

    pub async fn get(&self, key: &str) -> (StatusCode, Option<Entry>) {
        self.read_entry("/get", key).await
    }

    pub async fn local_read(&self, key: &str) -> (StatusCode, Option<Entry>) {
        self.read_entry("/local_read", key).await
    }

    pub async fn replicate(&self, key: &str, value: &str, timestamp: i64) -> StatusCode {
        let timestamp = timestamp.to_string();
        self.client
            .post(format!("{}/replicate", self.url))
            .query(&[("key", key), ("value", value), ("timestamp", timestamp.as_str())])
            .send()
            .await
            .unwrap()
            .status()
    }

    pub async fn reconfigure(&self, query: &[(&str, &str)]) -> String {
        self.client
            .post(format!("{}/config", self.url))
            .query(query)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }
}
