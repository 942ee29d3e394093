mod common;

use gossip_membership::address::Address;
use gossip_membership::config::MembershipConfig;
use gossip_membership::engine::NodeState;
use gossip_membership::entry::DEAD_MARKER;
use gossip_membership::message::{Message, MessageKind};
use gossip_membership::selector::RoundRobinSelector;

use crate::common::SimCluster;

fn config(fanout: usize) -> MembershipConfig {
    MembershipConfig {
        t_fail: 5,
        t_remove: 20,
        fanout,
        tick_interval_ms: 10,
    }
}

#[test]
fn join_handshake() {
    let mut cluster = SimCluster::new(config(3));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    cluster.join(a, a);
    assert_eq!(cluster.node(a).state(), NodeState::Active);
    assert!(cluster.network.log().is_empty());

    cluster.join(b, a);
    assert_eq!(cluster.node(b).state(), NodeState::Joining);
    assert_eq!(cluster.node(a).members(), vec![a]);
    let log = cluster.network.log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].decode().kind(), MessageKind::JoinReq);

    cluster.step();
    assert_eq!(cluster.node(a).members(), vec![a, b]);
    let reply = cluster
        .network
        .frames_from(a, 1)
        .into_iter()
        .find(|f| f.decode().kind() == MessageKind::JoinRep)
        .expect("join reply");
    assert_eq!(reply.to, b);
    assert_eq!(reply.entries().len(), 2);

    cluster.step();
    assert_eq!(cluster.node(b).state(), NodeState::Active);
    assert_eq!(cluster.node(b).members(), vec![a, b]);
}

#[test]
fn three_nodes_converge() {
    let mut cluster = SimCluster::new(config(3));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    let c = SimCluster::address(2);
    cluster.join(a, a);
    cluster.join(b, a);
    cluster.step();
    cluster.join(c, a);

    // ceil(log2(3)) + 1 rounds on every node
    let rounds = 3;
    let mut guard = 0;
    while cluster.nodes.values().any(|n| n.stats().rounds < rounds) {
        cluster.step();
        guard += 1;
        assert!(guard < 10, "nodes never became active");
    }
    for node in [a, b, c] {
        assert_eq!(cluster.node(node).members(), vec![a, b, c]);
        assert_eq!(cluster.node(node).table().len(), 3);
    }
}

#[test]
fn single_peer_gets_every_round() {
    let mut cluster = SimCluster::new(config(4));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    cluster.join(a, a);
    cluster.join(b, a);
    cluster.run(3);
    let now = cluster.now();
    let frames = cluster.network.frames_from(a, now);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].to, b);
}

#[test]
fn self_heartbeat_counts_rounds() {
    let mut cluster = SimCluster::new(config(2));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    cluster.join(a, a);
    cluster.join(b, a);
    cluster.run(2);
    assert!(cluster.node(b).is_in_group());
    let start = cluster.node(b).heartbeat();
    let rounds = cluster.node(b).stats().rounds;
    cluster.run(12);
    let node = cluster.node(b);
    assert_eq!(node.heartbeat(), start + 12);
    assert_eq!(node.stats().rounds, rounds + 12);
    assert_eq!(node.table().get(&b).unwrap().heartbeat, start + 12);
}

#[test]
fn crashed_node_is_suspected_then_removed() {
    let config = config(3);
    let mut cluster = SimCluster::new(config.clone());
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    let c = SimCluster::address(2);
    cluster.join(a, a);
    cluster.join(b, a);
    cluster.join(c, a);
    cluster.run(6);
    assert!(cluster.converged());

    cluster.crash(b);
    // frames already in flight from b are delivered during this step
    cluster.step();
    cluster.step();
    let last_update = cluster.node(a).table().get(&b).unwrap().last_updated;
    let heartbeat = cluster.node(a).table().get(&b).unwrap().heartbeat;

    let gossiped_heartbeat = |cluster: &SimCluster| -> Vec<i64> {
        cluster
            .network
            .frames_from(a, cluster.now())
            .iter()
            .filter(|f| f.decode().kind() == MessageKind::Heartbeat)
            .flat_map(|f| f.entries())
            .filter(|e| e.address() == b)
            .map(|e| e.heartbeat)
            .collect()
    };

    while cluster.now() < last_update + config.t_fail {
        cluster.step();
    }
    let seen = gossiped_heartbeat(&cluster);
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|h| *h == heartbeat));

    cluster.step();
    assert_eq!(cluster.now(), last_update + config.t_fail + 1);
    let seen = gossiped_heartbeat(&cluster);
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|h| *h == DEAD_MARKER));
    assert!(cluster.node(a).table().contains(&b));

    while cluster.now() < last_update + config.t_remove {
        cluster.step();
    }
    assert!(cluster.node(a).table().contains(&b));
    cluster.step();
    assert!(!cluster.node(a).table().contains(&b));

    cluster.run(config.t_remove as usize);
    assert_eq!(cluster.node(a).members(), vec![a, c]);
    assert_eq!(cluster.node(c).members(), vec![a, c]);
}

#[test]
fn ten_nodes_converge_with_small_fanout() {
    let mut cluster = SimCluster::new(config(2));
    let introducer = Address::default_introducer();
    assert_eq!(introducer, SimCluster::address(0));
    cluster.join(introducer, introducer);
    for index in 1..10 {
        cluster.join(SimCluster::address(index), introducer);
        cluster.step();
    }
    cluster.run(30);
    assert!(cluster.converged());
    for node in cluster.nodes.values() {
        assert_eq!(node.stats().malformed, 0);
    }
}

#[test]
fn round_robin_cluster_converges() {
    let mut cluster = SimCluster::new(config(1));
    let introducer = SimCluster::address(0);
    cluster.add_with(introducer, Box::new(RoundRobinSelector::default()));
    cluster
        .nodes
        .get_mut(&introducer)
        .unwrap()
        .join(introducer, 0)
        .unwrap();
    for index in 1..5 {
        let address = SimCluster::address(index);
        cluster.add_with(address, Box::new(RoundRobinSelector::default()));
        cluster.nodes.get_mut(&address).unwrap().join(introducer, 0).unwrap();
    }
    cluster.run(25);
    assert!(cluster.converged());
}

#[test]
fn late_join_reply_is_idempotent() {
    let mut cluster = SimCluster::new(config(3));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    cluster.join(a, a);
    cluster.join(b, a);
    // a retried join produces a second reply
    cluster.nodes.get_mut(&b).unwrap().join(a, 0).unwrap();
    cluster.run(3);
    let node = cluster.node(b);
    assert_eq!(node.state(), NodeState::Active);
    assert_eq!(node.members(), vec![a, b]);
    let replies = cluster
        .network
        .log()
        .into_iter()
        .filter(|f| f.to == b && matches!(f.decode(), Message::JoinRep(_)))
        .count();
    assert_eq!(replies, 2);
}

#[test]
fn frames_and_entries_follow_the_shared_clock() {
    let mut cluster = SimCluster::new(config(2));
    let a = SimCluster::address(0);
    let b = SimCluster::address(1);
    cluster.clock.set(40);
    cluster.join(a, a);
    cluster.join(b, a);
    let request = cluster.network.log().pop().unwrap();
    assert_eq!(request.sent_at, 40);
    cluster.run(2);
    assert_eq!(cluster.now(), 42);
    assert!(cluster.node(b).is_in_group());
    let entry = cluster.node(b).table().get(&a).unwrap();
    assert!(entry.last_updated > 40 && entry.last_updated <= 42);
    assert!(cluster.network.log().iter().all(|f| f.sent_at >= 40));
}
