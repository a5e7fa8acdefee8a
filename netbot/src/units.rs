//! SPICE engineering values.

/// Parse a SPICE-style value with an optional engineering suffix.
///
/// Suffixes are case-insensitive: `T`, `G`, `MEG`, `K`, `M` (milli), `MIL`,
/// `U`, `N`, `P`, `F`. Trailing unit letters after a recognised suffix are
/// ignored the way SPICE ignores them (`10kOhm`, `1uF`).
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let num_end = numeric_prefix_len(&s);
    if num_end == 0 {
        return None;
    }

    let (num_str, suffix) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;

    let multiplier = if suffix.starts_with("MEG") {
        1e6
    } else if suffix.starts_with("MIL") {
        25.4e-6
    } else {
        match suffix.chars().next() {
            Some('T') => 1e12,
            Some('G') => 1e9,
            Some('K') => 1e3,
            Some('M') => 1e-3,
            Some('U') => 1e-6,
            Some('N') => 1e-9,
            Some('P') => 1e-12,
            Some('F') => 1e-15,
            // bare unit names: "5V", "3A", "10Hz", "2s"
            Some('V') | Some('A') | Some('H') | Some('S') => 1.0,
            _ => return None,
        }
    };

    Some(value * multiplier)
}

/// Length of the leading numeric part, exponent included.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_digit() {
            seen_digit = true;
        } else if c == '.' || ((c == '-' || c == '+') && end == 0) {
            // mantissa punctuation
        } else if c == 'E' && seen_digit {
            // only an exponent when followed by a digit or sign+digit
            let rest = &s[end + 1..];
            let exp_digits = rest.trim_start_matches(['+', '-']);
            if !exp_digits.starts_with(|ch: char| ch.is_ascii_digit()) {
                break;
            }
            end += 1 + (rest.len() - exp_digits.len());
            continue;
        } else {
            break;
        }
        end += 1;
    }
    end
}

/// Format a number the way it is written back into a directive line.
///
/// Short plain renderings are kept (`10`, `0.001`, `1.5`); anything longer
/// falls back to three-decimal scientific notation (`5.003e-3`).
pub fn spice_number(value: f64) -> String {
    let plain = format!("{}", value);
    if plain.len() <= 8 {
        plain
    } else {
        format!("{:.3e}", value)
    }
}
