//! Internet checksum (RFC 1071) over ICMP packets.

/// Computes the one's complement of the one's-complement sum of `data`
/// taken as big-endian 16-bit words.
///
/// An odd trailing byte is treated as the high byte of a final word whose low
/// byte is zero. Run it once over a packet whose checksum field is zero, then
/// store the result in that field.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        sum = fold(sum);
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    !(fold(sum) as u16)
}

/// Returns true if `data`, checksum field included, sums to `0xFFFF`.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

fn fold(mut sum: u32) -> u32 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum
}
