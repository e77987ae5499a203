//! Target address classification
//!
//! Decides whether a target sits in the RFC 1918 private IPv4 space and
//! therefore needs the bastion relay. Pure and deterministic; an identifier
//! that does not parse as IPv4 is a normal negative outcome, not an error.

use std::net::Ipv4Addr;

/// Whether a target address is privately or publicly routable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    Private,
    Public,
}

// RFC 1918 private blocks, inclusive
const BLOCK_24BIT: ([u8; 4], [u8; 4]) = ([10, 0, 0, 0], [10, 255, 255, 255]);
const BLOCK_20BIT: ([u8; 4], [u8; 4]) = ([172, 16, 0, 0], [172, 31, 255, 255]);
const BLOCK_16BIT: ([u8; 4], [u8; 4]) = ([192, 168, 0, 0], [192, 168, 255, 255]);

/// Classify a target identifier
///
/// Returns `None` when the identifier is not a valid IPv4 address.
#[must_use]
pub fn classify(target: &str) -> Option<AddressClass> {
    let addr: Ipv4Addr = target.parse().ok()?;
    let octets = addr.octets();

    // Byte-wise inclusive bounds, matching bytes-comparison semantics
    let private = in_block(octets, BLOCK_24BIT)
        || in_block(octets, BLOCK_20BIT)
        || in_block(octets, BLOCK_16BIT);

    Some(if private {
        AddressClass::Private
    } else {
        AddressClass::Public
    })
}

fn in_block(octets: [u8; 4], (low, high): ([u8; 4], [u8; 4])) -> bool {
    octets >= low && octets <= high
}
