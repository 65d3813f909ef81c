//! # Additive Checksum
//!
//! Both frame directions end with the 8-bit wrapping sum of every preceding
//! byte, marker included.

/// Calculate the 8-bit additive checksum of `data`
///
/// # Examples
///
/// ```
/// use procon_bridge::link::checksum::sum8;
///
/// assert_eq!(sum8(&[0xBB, 0x01]), 0xBC);
/// assert_eq!(sum8(&[0xFF, 0x02]), 0x01);
/// ```
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

/// Verify a complete frame whose last byte is its checksum
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&expected, body)) => sum8(body) == expected,
        None => false,
    }
}
