//! Per-field checksum.

/// Separator between name, value and checksum on a field line.
pub const FIELD_SEPARATOR: u8 = 0x20;

/// Compute the checksum character for one field.
///
/// The sum (mod 256) of the name bytes, one separator space and the value bytes is
/// reduced to its low 6 bits and shifted into the printable range, so the result is
/// always in `0x20..=0x5F`.
pub fn checksum(name: &[u8], value: &[u8]) -> u8 {
    let sum = name
        .iter()
        .chain(std::iter::once(&FIELD_SEPARATOR))
        .chain(value)
        .fold(0u8, |acc, b| acc.wrapping_add(*b));

    (sum & 0x3F) + 0x20
}
