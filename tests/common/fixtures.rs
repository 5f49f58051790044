//! Standard test fixtures.

use snmp_query::{Oid, Value, oid};
use std::collections::BTreeMap;

/// The six-entry reference store:
///
/// ```text
/// 1.1.1   -> "val1.1.1"
/// 1.1.1.1 -> "val1.1.1.1"
/// 1.1.1.2 -> "val1.1.1.2"
/// 1.1.2   -> "val1.1.2"
/// 1.1.3.1 -> "val1.1.3.1"
/// 1.1.3.2 -> "val1.1.3.2"
/// ```
pub fn tree_store() -> BTreeMap<Oid, Value> {
    let mut data = BTreeMap::new();
    for arcs in [
        vec![1u32, 1, 1],
        vec![1, 1, 1, 1],
        vec![1, 1, 1, 2],
        vec![1, 1, 2],
        vec![1, 1, 3, 1],
        vec![1, 1, 3, 2],
    ] {
        let oid = Oid::new(arcs.iter().copied());
        let value = Value::from(format!("val{}", oid));
        data.insert(oid, value);
    }
    data
}

/// Standard system group entries (1.3.6.1.2.1.1).
pub fn system_mib() -> BTreeMap<Oid, Value> {
    let mut data = BTreeMap::new();
    data.insert(
        oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
        Value::OctetString("Test SNMP Agent".into()),
    );
    data.insert(
        oid!(1, 3, 6, 1, 2, 1, 1, 2, 0),
        Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 99999)),
    );
    data.insert(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(123456));
    data.insert(
        oid!(1, 3, 6, 1, 2, 1, 1, 5, 0),
        Value::OctetString("test-agent".into()),
    );
    data.insert(oid!(1, 3, 6, 1, 2, 1, 1, 7, 0), Value::Integer(72));
    data
}
