//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use bytes::Bytes;

use spine_decision::decision::{
    Decision, DecisionConfig, adjacency_db_key, prefix_db_key,
};
use spine_utils::kv::{Publication, TTL_INFINITY, Value};
use spine_utils::lsdb::PrefixDatabase;

use common::{AREA, adj_db, prefix_entry, v4_prefix};

fn kv_value(node_name: &str, payload: Vec<u8>) -> Value {
    Value::new(
        1,
        node_name.to_owned(),
        Some(Bytes::from(payload)),
        TTL_INFINITY,
        0,
    )
}

#[test]
fn test_publication_ingest_and_rebuild() {
    let mut decision = Decision::new(DecisionConfig::new("1"));
    let prefix = v4_prefix("10.100.0.0/24");

    // Adjacency and prefix databases arrive as KV store values.
    let mut publication = Publication {
        area: AREA.to_owned(),
        ..Default::default()
    };
    for (node, adjs) in [
        (1, &[(2u32, 10u64), (3u32, 5u64)] as &[(u32, u64)]),
        (2, &[(1u32, 10u64), (3u32, 20u64)]),
        (3, &[(1u32, 5u64), (2u32, 20u64)]),
    ] {
        let adj_db = adj_db(node, 0, adjs);
        publication.key_vals.insert(
            adjacency_db_key(&node.to_string()),
            kv_value(
                &node.to_string(),
                serde_json::to_vec(&adj_db).unwrap(),
            ),
        );
    }
    let prefix_db =
        PrefixDatabase::new("3", AREA, vec![prefix_entry(prefix)]);
    publication.key_vals.insert(
        prefix_db_key("3"),
        kv_value("3", serde_json::to_vec(&prefix_db).unwrap()),
    );

    assert!(decision.process_publication(&publication).unwrap());

    let update = decision.rebuild().unwrap();
    let route = &update.unicast_routes_to_update[&prefix];
    assert_eq!(route.igp_cost, 5);
    assert_eq!(
        route.nexthops.iter().next().unwrap().neighbor_node_name,
        "3"
    );

    // A rebuild without changes produces an empty delta.
    let update = decision.rebuild().unwrap();
    assert!(update.is_empty());

    // Malformed payloads are skipped without aborting the rest.
    let mut bad_publication = Publication {
        area: AREA.to_owned(),
        ..Default::default()
    };
    bad_publication.key_vals.insert(
        adjacency_db_key("2"),
        kv_value("2", b"not json".to_vec()),
    );
    assert!(!decision.process_publication(&bad_publication).unwrap());

    // Expired keys withdraw the databases they carried.
    let expired_publication = Publication {
        area: AREA.to_owned(),
        expired_keys: vec![adjacency_db_key("3"), prefix_db_key("3")],
        ..Default::default()
    };
    assert!(decision.process_publication(&expired_publication).unwrap());

    let update = decision.rebuild().unwrap();
    assert_eq!(update.unicast_routes_to_delete, vec![prefix]);
    assert!(decision.route_db().unicast_routes.is_empty());
}
