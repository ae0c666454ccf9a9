//! Health aggregation helpers.

use betterspotlight_domain::value_objects::{IndexHealth, RetrievalAdvisory};
use serde_json::{json, Value};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Current process RSS in bytes, via sysinfo.
#[must_use]
pub fn self_memory_bytes() -> u64 {
    let mut system = System::new();
    let pid = Pid::from_u32(std::process::id());
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map_or(0, sysinfo::Process::memory)
}

/// Coverage advisory for the GUI, derived from store health.
#[must_use]
pub fn retrieval_advisory(health: &IndexHealth) -> Option<RetrievalAdvisory> {
    if health.total_indexed_items == 0 {
        return Some(RetrievalAdvisory::CuratedRootsRecommended);
    }
    if health.items_without_content * 2 > health.total_indexed_items {
        return Some(RetrievalAdvisory::RootFanoutRecommended);
    }
    None
}

/// Wire form of the advisory.
#[must_use]
pub fn advisory_json(advisory: Option<RetrievalAdvisory>) -> Value {
    advisory.map_or(Value::Null, |a| json!({"code": a.as_str()}))
}

/// Overall health status reason string.
#[must_use]
pub fn status_reason(health: &IndexHealth, critical_failures: i64) -> &'static str {
    if critical_failures > 0 {
        "critical_failures"
    } else if health.total_indexed_items == 0 {
        "index_empty"
    } else {
        "ok"
    }
}
