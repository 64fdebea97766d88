use serde::Serialize;

const MIB: f64 = 1024.0 * 1024.0;

/// Read-only snapshot of cache occupancy, serialized for the stats
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    #[serde(rename = "totalMB")]
    pub total_mb: f64,
    #[serde(rename = "avgEntryKB")]
    pub avg_entry_kb: f64,
    #[serde(rename = "maxEntries")]
    pub max_entries: usize,
    #[serde(rename = "maxMB")]
    pub max_mb: f64,
    #[serde(rename = "currentMB")]
    pub current_mb: f64,
    #[serde(rename = "expiryHours")]
    pub expiry_hours: f64,
}

impl CacheStats {
    pub(crate) fn compute(
        entries: usize,
        memory_bytes: usize,
        max_entries: usize,
        max_memory_bytes: usize,
        expiry_secs: f64,
    ) -> Self {
        let total_mb = memory_bytes as f64 / MIB;
        let avg_entry_kb = if entries == 0 {
            0.0
        } else {
            memory_bytes as f64 / entries as f64 / 1024.0
        };

        Self {
            entries,
            total_mb: round2(total_mb),
            avg_entry_kb: round2(avg_entry_kb),
            max_entries,
            max_mb: round2(max_memory_bytes as f64 / MIB),
            current_mb: round2(total_mb),
            expiry_hours: round2(expiry_secs / 3600.0),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
