//! Shared `utdb` fixture.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use keepx_core::{CompositeKey, Database, FixedClock, NodeId};
use std::sync::Arc;

pub const PASSWORD: &str = "12345";

/// Ids of the fixture's named nodes.
pub struct Utdb {
    pub db: Database,
    pub clock: Arc<FixedClock>,
    pub root: NodeId,
    pub general: NodeId,
    pub g1: NodeId,
    pub g21: NodeId,
    pub g21e1: NodeId,
    pub windows: NodeId,
    pub w1: NodeId,
    pub w5: NodeId,
    pub root_entry: NodeId,
}

/// ```text
/// utdb/
///   General/G1/G21/G21E1
///   Windows/W1/W2/W3/W4/W5
///   Sample Entry
/// ```
pub fn utdb() -> Utdb {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
    ));
    let mut db = Database::create_with_clock(
        "utdb",
        CompositeKey::from_password(PASSWORD),
        clock.clone(),
    );
    let root = db.root_group().unwrap().id;

    let general = db.add_group(root, "General").unwrap();
    let g1 = db.add_group(general, "G1").unwrap();
    let g21 = db.add_group(g1, "G21").unwrap();
    let g21e1 = db.add_entry(g21, "G21E1").unwrap();

    let windows = db.add_group(root, "Windows").unwrap();
    let w1 = db.add_group(windows, "W1").unwrap();
    let mut parent = w1;
    for name in ["W2", "W3", "W4", "W5"] {
        parent = db.add_group(parent, name).unwrap();
    }
    let w5 = parent;

    let root_entry = db.add_entry(root, "Sample Entry").unwrap();
    db.update_entry(root_entry, |e| {
        e.set("UserName", "tester");
        e.set("URL", "https://example.com");
        e.set("Password", "p@ss");
    })
    .unwrap();

    Utdb {
        db,
        clock,
        root,
        general,
        g1,
        g21,
        g21e1,
        windows,
        w1,
        w5,
        root_entry,
    }
}
