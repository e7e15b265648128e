//! GPU type extraction from machine descriptors, plus the comma-separated
//! GPU filter lists accepted by machine queries.

use regex::{Captures, Regex};
use std::sync::OnceLock;

pub const UNKNOWN_GPU: &str = "Unknown";

type Formatter = fn(&Captures) -> String;

// Order matters: RTX before the letter-prefixed codes, H/B/L before A.
fn patterns() -> &'static [(Regex, Formatter)] {
    static PATTERNS: OnceLock<Vec<(Regex, Formatter)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(&str, Formatter); 3] = [
            (r"(?i)RTX\s*(\d{4})", |c| format!("RTX{}", &c[1])),
            (r"(?i)([HBL])(\d{2,3}S?)", |c| {
                format!("{}{}", c[1].to_ascii_uppercase(), c[2].to_ascii_uppercase())
            }),
            (r"(?i)A(\d{2,3})", |c| format!("A{}", &c[1])),
        ];
        table
            .into_iter()
            .filter_map(|(re, fmt)| Regex::new(re).ok().map(|re| (re, fmt)))
            .collect()
    })
}

/// Canonical short GPU name for a machine descriptor.
///
/// `"NVIDIA RTX 4090 Server"` -> `"RTX4090"`, `"Tesla H100 Machine"` -> `"H100"`.
/// Unrecognised descriptors fall back to their last whitespace token; an empty
/// descriptor yields [`UNKNOWN_GPU`].
pub fn extract_gpu_type(machine_name: &str) -> String {
    for (re, fmt) in patterns() {
        if let Some(caps) = re.captures(machine_name) {
            return fmt(&caps);
        }
    }
    machine_name
        .split_whitespace()
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_GPU.to_string())
}

/// Parse a comma-separated GPU list such as `"H100, A100"`.
///
/// - Trims whitespace
/// - Drops empty entries
pub fn parse_gpu_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Case-insensitive match of an executor's GPU type against wanted types.
/// Wanted entries may be written either canonically (`RTX4090`) or as a
/// descriptor fragment (`RTX 4090`). An empty list matches everything.
pub fn gpu_type_matches(gpu_type: &str, wanted: &[String]) -> bool {
    if wanted.is_empty() {
        return true;
    }
    let have = gpu_type.trim();
    wanted.iter().any(|w| {
        let w = w.trim();
        have.eq_ignore_ascii_case(w) || have.eq_ignore_ascii_case(&extract_gpu_type(w))
    })
}
