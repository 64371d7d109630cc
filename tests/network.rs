//! End-to-end scenarios driving a real `Supervisor` over `tokio::mpsc`
//! channels, mirroring the reference simulator's own scripted runs.

use std::time::Duration;

use token_mutex::{Config, Supervisor, SupervisorBuilder};

const EPSILON_MESSAGES: u64 = 0;

/// A single node is its own root with nothing to contend with: it should
/// keep entering its critical section on every inter-arrival tick without
/// ever touching the transport.
#[tokio::test]
async fn single_node_root_enters_cs_without_sending_messages() {
    let config = Config {
        activity_rate: 10.0,
        cs_duration: Duration::from_millis(5),
        ..Config::default()
    };
    let mut supervisor = SupervisorBuilder::new(config)
        .with_node(1, None, None)
        .build()
        .unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (messages_sent, requests_issued) = supervisor.stop().await;

    assert_eq!(messages_sent, EPSILON_MESSAGES);
    assert!(requests_issued > 0, "the lone node should have asked for itself at least once");
}

/// A five-node chain `1-2-3-4-5` rooted at 5. Only node 1 is active; its
/// request has to cross three intermediate hops before the token moves,
/// generating at least one REQUEST per hop and one ASSIGN back.
#[tokio::test]
async fn linear_chain_request_propagates_end_to_end() {
    let config = Config {
        activity_rate: 0.0,
        cs_duration: Duration::from_millis(10),
        ..Config::default()
    };
    let mut supervisor = SupervisorBuilder::new(config)
        .with_node(5, None, None)
        .with_node(4, Some(5), None)
        .with_node(3, Some(4), None)
        .with_node(2, Some(3), None)
        .with_node(1, Some(2), Some(50.0))
        .build()
        .unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let (messages_sent, requests_issued) = supervisor.stop().await;

    assert!(requests_issued >= 1);
    // 4 REQUESTs (1->2->3->4->5) plus 4 ASSIGNs (5->4->3->2->1) at minimum
    // for the first round trip.
    assert!(
        messages_sent >= 8,
        "expected the request to cross every hop and the token to travel back, got {messages_sent}"
    );
}

/// Two leaves of a star both request before the token moves anywhere; the
/// center should serve them one after another without dropping either.
#[tokio::test]
async fn two_racing_requesters_are_both_served() {
    let config = Config {
        activity_rate: 0.0,
        cs_duration: Duration::from_millis(10),
        ..Config::default()
    };
    let mut supervisor = SupervisorBuilder::new(config)
        .with_node(3, None, None)
        .with_node(1, Some(3), Some(80.0))
        .with_node(2, Some(3), Some(80.0))
        .with_node(4, Some(3), None)
        .with_node(5, Some(3), None)
        .build()
        .unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    let (_, requests_issued) = supervisor.stop().await;

    assert!(requests_issued >= 2, "both leaves should have asked for the token");
}

/// Failing the root while it holds the token (with a request outstanding)
/// must not panic the resource sentinel and must leave the network able
/// to make progress once recovery finishes.
#[tokio::test]
async fn failing_the_token_holder_recovers_without_a_sentinel_violation() {
    let config = Config {
        activity_rate: 0.0,
        cs_duration: Duration::from_millis(10),
        downtime: Duration::from_millis(150),
        ..Config::default()
    };
    let mut supervisor = SupervisorBuilder::new(config)
        .with_node(3, None, None)
        .with_node(1, Some(3), Some(40.0))
        .with_node(2, Some(3), None)
        .build()
        .unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(supervisor.fail_node(3).await, "node 3 should be running");
    assert!(supervisor.is_node_in_recovery(3).await);

    // Give it time to sleep out its downtime and complete the
    // RESTART/ADVISE handshake with both neighbors.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!supervisor.is_node_in_recovery(3).await, "node 3 should have finished recovering");

    let (messages_sent, _) = supervisor.stop().await;
    assert!(messages_sent > 0);
}

/// Failing a non-root interior node in a chain should still let the
/// network converge: both sides keep advising each other and the failed
/// node comes back out of recovery.
#[tokio::test]
async fn failing_a_non_root_interior_node_recovers() {
    let config = Config {
        activity_rate: 0.0,
        cs_duration: Duration::from_millis(10),
        downtime: Duration::from_millis(150),
        ..Config::default()
    };
    let mut supervisor = SupervisorBuilder::new(config)
        .with_node(5, None, None)
        .with_node(4, Some(5), None)
        .with_node(3, Some(4), None)
        .with_node(2, Some(3), None)
        .with_node(1, Some(2), Some(40.0))
        .build()
        .unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(supervisor.fail_node(3).await);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!supervisor.is_node_in_recovery(3).await);
    let (messages_sent, _) = supervisor.stop().await;
    assert!(messages_sent > 0);
}

/// An 18-node tree running under light, uniform request pressure should
/// keep its message-to-request ratio within a small constant factor of
/// `log2(18)`, since the token never has to cross more hops than the
/// tree's depth.
#[tokio::test]
async fn complexity_stays_within_a_constant_factor_of_log_n() {
    let config = Config {
        activity_rate: 0.0,
        cs_duration: Duration::from_millis(2),
        ..Config::default()
    };
    let mut builder = SupervisorBuilder::new(config).with_node(1, None, Some(20.0));
    // A balanced-ish binary tree over ids 2..=18, each child's holder is
    // its parent (parent = id / 2).
    for id in 2..=18u64 {
        builder = builder.with_node(id, Some(id / 2), Some(20.0));
    }
    let mut supervisor = builder.build().unwrap();

    supervisor.start().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let (messages_sent, requests_issued) = supervisor.stop().await;

    assert!(requests_issued > 0);
    let ratio = messages_sent as f64 / requests_issued as f64;
    let log2_n = (18f64).log2();
    assert!(
        ratio < log2_n * 6.0,
        "messages/requests ratio {ratio} is far beyond log2(18) = {log2_n}"
    );
}
