//! Internet checksum - RFC 1071, with incremental update per RFC 1624

use std::net::{Ipv4Addr, Ipv6Addr};

/// Add `data` as big-endian 16-bit words to `sum`, zero-padding an odd tail.
pub fn sum_words(data: &[u8], mut sum: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }
    sum
}

/// Fold carries into the low 16 bits until none remain.
pub fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// One's complement of the one's complement sum of `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data, 0))
}

/// Adjust `old_checksum` for one 16-bit field changing from `old_field` to `new_field`.
///
/// Computes `~(~HC + ~m + m')` so only the changed field is touched.
pub fn incremental_update(old_checksum: u16, old_field: u16, new_field: u16) -> u16 {
    let sum = (!old_checksum) as u32 + (!old_field) as u32 + new_field as u32;
    !fold(sum)
}

/// Same as [`incremental_update`] for a 32-bit field such as an IPv4 address.
pub fn incremental_update_u32(old_checksum: u16, old_field: u32, new_field: u32) -> u16 {
    let hi = incremental_update(old_checksum, (old_field >> 16) as u16, (new_field >> 16) as u16);
    incremental_update(hi, old_field as u16, new_field as u16)
}

/// Unfolded sum of the IPv4 pseudo-header.
pub fn pseudo_header_v4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, length: u16) -> u32 {
    let mut sum = sum_words(&src.octets(), 0);
    sum = sum_words(&dst.octets(), sum);
    sum + protocol as u32 + length as u32
}

/// Unfolded sum of the IPv6 pseudo-header: src, dst, 32-bit length, next header.
pub fn pseudo_header_v6(src: Ipv6Addr, dst: Ipv6Addr, length: u32, next_header: u8) -> u32 {
    let mut sum = sum_words(&src.octets(), 0);
    sum = sum_words(&dst.octets(), sum);
    sum = sum_words(&length.to_be_bytes(), sum);
    sum + next_header as u32
}

/// TCP/UDP checksum over an IPv4 pseudo-header plus the segment.
pub fn transport_checksum_v4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let sum = pseudo_header_v4(src, dst, protocol, segment.len() as u16);
    !fold(sum_words(segment, sum))
}

/// Upper-layer checksum over an IPv6 pseudo-header plus the message.
pub fn transport_checksum_v6(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, message: &[u8]) -> u16 {
    let sum = pseudo_header_v6(src, dst, message.len() as u32, next_header);
    !fold(sum_words(message, sum))
}
