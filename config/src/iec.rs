//! Parses human readable byte sizes using IEC binary units, e.g. `"128 MiB"`.

use eyre::{
    bail,
    Result,
};

const UNITS: [(&str, u64); 6] = [
    ("B", 1),
    ("KiB", 1 << 10),
    ("MiB", 1 << 20),
    ("GiB", 1 << 30),
    ("TiB", 1 << 40),
    ("PiB", 1 << 50),
];

/// Parses a size such as `"0"`, `"512"`, `"1 MiB"` or `"10GiB"` into bytes.
pub fn parse_iec_size(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    if number.is_empty() {
        bail!("Invalid size {input:?}: expected a number optionally followed by an IEC unit");
    }
    let number: u64 = number.parse()?;

    let unit = unit.trim();
    if unit.is_empty() {
        return Ok(number);
    }

    let Some((_, factor)) = UNITS.iter().find(|(name, _)| name.eq_ignore_ascii_case(unit)) else {
        bail!("Invalid size {input:?}: unknown unit {unit:?}, expected one of B, KiB, MiB, GiB, TiB, PiB");
    };

    match number.checked_mul(*factor) {
        Some(bytes) => Ok(bytes),
        None => bail!("Invalid size {input:?}: value overflows"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers_are_bytes() {
        assert_eq!(parse_iec_size("0").unwrap(), 0);
        assert_eq!(parse_iec_size("4096").unwrap(), 4096);
    }

    #[test]
    fn units_with_and_without_space() {
        assert_eq!(parse_iec_size("1 MiB").unwrap(), 1_048_576);
        assert_eq!(parse_iec_size("32MiB").unwrap(), 32 * 1_048_576);
        assert_eq!(parse_iec_size("10 GiB").unwrap(), 10 * 1_073_741_824);
        assert_eq!(parse_iec_size("2 kib").unwrap(), 2048);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iec_size("").is_err());
        assert!(parse_iec_size("MiB").is_err());
        assert!(parse_iec_size("1 MB").is_err());
        assert!(parse_iec_size("99999999 PiB").is_err());
    }
}
