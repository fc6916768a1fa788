//! Parsing of Kubernetes resource quantities (`"250m"`, `"16Gi"`, `"12345678n"`)

use tracing::warn;

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millis(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();

    let millis = if let Some(nanos) = quantity.strip_suffix('n') {
        nanos.parse::<f64>().ok()? / 1_000_000.0
    } else if let Some(micros) = quantity.strip_suffix('u') {
        micros.parse::<f64>().ok()? / 1000.0
    } else if let Some(millis) = quantity.strip_suffix('m') {
        millis.parse::<f64>().ok()?
    } else if let Ok(cores) = quantity.parse::<f64>() {
        cores * 1000.0
    } else {
        warn!(quantity, "Failed to parse CPU quantity");
        return None;
    };

    Some(millis.round().max(0.0) as u64)
}

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();

    // Split where the number ends and the unit begins; `e`/`E` followed by
    // digits is an exponent, not the exa suffix
    let (num, unit) = quantity
        .char_indices()
        .find(|&(idx, c)| c.is_alphabetic() && !is_exponent(&quantity[idx..]))
        .map_or((quantity, ""), |(idx, _)| quantity.split_at(idx));

    let value = num.parse::<f64>().ok()?;

    let multiplier = match unit {
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Pi" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Ei" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "m" => 1e-3,
        "" => 1.0,
        _ => {
            warn!(quantity, unit, "Unknown memory unit in quantity");
            return None;
        }
    };

    Some((value * multiplier).max(0.0) as u64)
}

fn is_exponent(rest: &str) -> bool {
    let Some(exponent) = rest.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
