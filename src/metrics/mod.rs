//! Derived metrics extracted from miner records.
//!
//! The core stores records verbatim and never interprets fields beyond the
//! `Valid` counter. Everything a consumer typically displays (numeric
//! hashrate, share ratios, cleaned-up uptime) is computed here by pure
//! functions over a [`MinerRecord`], so interpretation stays pluggable and
//! out of the update path.
//!
//! Defaults mirror what the miners themselves report when idle: `"0/0"`
//! shares, `"000d 00:00:00"` uptime, -100 dBm signal.

use crate::core::types::MinerRecord;

/// Share statistics parsed from the `accepted/total[/rate%]` field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShareStats {
    /// Shares accepted by the pool.
    pub accepted: u64,
    /// Shares submitted in total.
    pub total: u64,
    /// Rejected fraction as a percentage, rounded to 2 decimals.
    pub rejection_rate: f64,
}

/// Difficulty figures reported alongside the best difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolDifficulties {
    /// Current pool difficulty.
    pub pool_diff: String,
    /// Difficulty of the last share.
    pub last_diff: String,
    /// Network difficulty.
    pub net_diff: String,
}

/// Firmware and board metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardInfo {
    /// Board model string.
    pub board_type: String,
    /// Free heap in bytes.
    pub free_heap: i64,
}

/// Parse a human-readable hashrate string into H/s.
///
/// Accepts `"55.2MH/s"`, `"123K"`, `"950"` and the like: the `H/s` suffix is
/// stripped, an `M`/`m` marker scales by 1e6 and `K`/`k` by 1e3. Anything
/// unparseable yields 0.0 rather than an error; a garbled rate is displayed
/// as zero until the next broadcast.
pub fn parse_hash_rate(raw: &str) -> f64 {
    let cleaned = raw.replace("H/s", "").replace("h/s", "");
    let cleaned = cleaned.trim();

    if cleaned.contains('M') || cleaned.contains('m') {
        cleaned
            .replace('M', "")
            .replace('m', "")
            .trim()
            .parse::<f64>()
            .map(|v| v * 1_000_000.0)
            .unwrap_or(0.0)
    } else if cleaned.contains('K') || cleaned.contains('k') {
        cleaned
            .replace('K', "")
            .replace('k', "")
            .trim()
            .parse::<f64>()
            .map(|v| v * 1_000.0)
            .unwrap_or(0.0)
    } else {
        cleaned.parse::<f64>().unwrap_or(0.0)
    }
}

/// Parse an `accepted/total` or `accepted/total/rate%` share string.
pub fn parse_share(raw: &str) -> Option<ShareStats> {
    let mut parts = raw.split('/');
    let accepted = parts.next()?.trim().parse::<u64>().ok()?;
    let total = parts.next()?.trim().parse::<u64>().ok()?;

    let rejection_rate = if total > 0 {
        round2((total - accepted) as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    Some(ShareStats {
        accepted,
        total,
        rejection_rate,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Numeric hashrate in H/s (0.0 when absent or unparseable).
pub fn hash_rate_hs(record: &MinerRecord) -> f64 {
    parse_hash_rate(record.hash_rate().unwrap_or("0"))
}

/// Share statistics, when the `Share` field parses.
pub fn share_stats(record: &MinerRecord) -> Option<ShareStats> {
    parse_share(record.text_field("Share").unwrap_or("0/0"))
}

/// Uptime string with the control-character tail the firmware appends
/// trimmed off.
pub fn uptime(record: &MinerRecord) -> String {
    match record.text_field("Uptime") {
        Some(raw) if !raw.is_empty() => raw
            .split(|c: char| c.is_control())
            .next()
            .unwrap_or("")
            .to_string(),
        _ => "000d 00:00:00".to_string(),
    }
}

/// Fractional progress scaled to a percentage, rounded to 2 decimals.
pub fn progress_percent(record: &MinerRecord) -> f64 {
    match record.num_field("Progress") {
        Some(fraction) => round2(fraction * 100.0),
        None => 0.0,
    }
}

/// Device temperature in degrees Celsius (0.0 when absent).
pub fn temperature_c(record: &MinerRecord) -> f64 {
    record.num_field("Temp").unwrap_or(0.0)
}

/// Wi-Fi signal strength in dBm (-100 when absent).
pub fn wifi_rssi_dbm(record: &MinerRecord) -> i64 {
    record.int_field("RSSI").unwrap_or(-100)
}

/// Name of the pool currently in use.
pub fn pool_in_use(record: &MinerRecord) -> String {
    record
        .text_field("PoolInUse")
        .unwrap_or("Unknown")
        .to_string()
}

/// Firmware version string.
pub fn firmware_version(record: &MinerRecord) -> String {
    record.text_field("Version").unwrap_or("Unknown").to_string()
}

/// Best difficulty achieved, trimmed.
pub fn best_difficulty(record: &MinerRecord) -> String {
    record.best_diff().unwrap_or("0").trim().to_string()
}

/// Pool/last/network difficulty figures, trimmed.
pub fn pool_difficulties(record: &MinerRecord) -> PoolDifficulties {
    let diff = |key: &str| record.text_field(key).unwrap_or("0").trim().to_string();
    PoolDifficulties {
        pool_diff: diff("PoolDiff"),
        last_diff: diff("LastDiff"),
        net_diff: diff("NetDiff"),
    }
}

/// Board model and free heap.
pub fn board_info(record: &MinerRecord) -> BoardInfo {
    BoardInfo {
        board_type: record
            .text_field("BoardType")
            .unwrap_or("Unknown")
            .to_string(),
        free_heap: record.int_field("FreeHeap").unwrap_or(0),
    }
}
