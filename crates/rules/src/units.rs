//! Conversion of threshold targets into the unit the query returns.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Bytes,
    Bits,
    Time,
    Percent,
    BytesRate,
}

const KIB: f64 = 1024.0;

fn lookup(unit: &str) -> Option<(Family, f64)> {
    let entry = match unit {
        "bytes" | "decbytes" => (Family::Bytes, 1.0),
        "kbytes" => (Family::Bytes, KIB),
        "mbytes" => (Family::Bytes, KIB.powi(2)),
        "gbytes" => (Family::Bytes, KIB.powi(3)),
        "tbytes" => (Family::Bytes, KIB.powi(4)),
        "pbytes" => (Family::Bytes, KIB.powi(5)),
        "deckbytes" | "decKbytes" => (Family::Bytes, 1e3),
        "decmbytes" | "decMbytes" => (Family::Bytes, 1e6),
        "decgbytes" | "decGbytes" => (Family::Bytes, 1e9),
        "dectbytes" | "decTbytes" => (Family::Bytes, 1e12),
        "decpbytes" | "decPbytes" => (Family::Bytes, 1e15),

        "bits" | "decbits" => (Family::Bits, 1.0),
        "kbits" => (Family::Bits, KIB),
        "mbits" => (Family::Bits, KIB.powi(2)),
        "gbits" => (Family::Bits, KIB.powi(3)),
        "tbits" => (Family::Bits, KIB.powi(4)),
        "deckbits" | "decKbits" => (Family::Bits, 1e3),
        "decmbits" | "decMbits" => (Family::Bits, 1e6),
        "decgbits" | "decGbits" => (Family::Bits, 1e9),
        "dectbits" | "decTbits" => (Family::Bits, 1e12),

        "ns" => (Family::Time, 1e-6),
        "us" | "µs" => (Family::Time, 1e-3),
        "ms" => (Family::Time, 1.0),
        "s" => (Family::Time, 1e3),
        "m" => (Family::Time, 6e4),
        "h" => (Family::Time, 3.6e6),
        "d" => (Family::Time, 8.64e7),

        "percent" => (Family::Percent, 1.0),
        "percentunit" => (Family::Percent, 100.0),

        "Bps" | "binBps" => (Family::BytesRate, 1.0),
        "KiBs" => (Family::BytesRate, KIB),
        "MiBs" => (Family::BytesRate, KIB.powi(2)),
        "GiBs" => (Family::BytesRate, KIB.powi(3)),
        "TiBs" => (Family::BytesRate, KIB.powi(4)),
        _ => return None,
    };
    Some(entry)
}

/// Converts `value` from `from` into `to`. Unknown or mismatched units leave the value untouched.
pub fn convert(value: f64, from: &str, to: &str) -> f64 {
    if from.is_empty() || to.is_empty() || from == to {
        return value;
    }
    match (lookup(from), lookup(to)) {
        (Some((fa, a)), Some((fb, b))) if fa == fb => value * a / b,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_unit_is_identity() {
        assert_eq!(convert(42.0, "ms", "ms"), 42.0);
    }

    #[test]
    fn empty_unit_is_identity() {
        assert_eq!(convert(42.0, "", "ms"), 42.0);
        assert_eq!(convert(42.0, "s", ""), 42.0);
    }

    #[test]
    fn time_units() {
        assert_eq!(convert(2.0, "s", "ms"), 2000.0);
        assert_eq!(convert(90.0, "m", "h"), 1.5);
    }

    #[test]
    fn data_units() {
        assert_eq!(convert(1.0, "gbytes", "mbytes"), 1024.0);
        assert_eq!(convert(1.0, "decGbytes", "decMbytes"), 1000.0);
        assert_eq!(convert(2.0, "kbytes", "bytes"), 2048.0);
    }

    #[test]
    fn percent_units() {
        assert_eq!(convert(0.5, "percentunit", "percent"), 50.0);
        assert_eq!(convert(75.0, "percent", "percentunit"), 0.75);
    }

    #[test]
    fn cross_family_is_identity() {
        assert_eq!(convert(5.0, "s", "bytes"), 5.0);
        assert_eq!(convert(5.0, "furlongs", "s"), 5.0);
    }
}
