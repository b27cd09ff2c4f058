use alloy_primitives::{Address, Bytes, B256};

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Parses a `0x`-prefixed 20-byte address.
///
/// All-lowercase and all-uppercase input is taken as-is. Mixed case is only
/// accepted when it is a valid EIP-55 checksum.
pub fn parse_address(s: &str) -> Result<Address, String> {
    let s = s.trim();
    let body = strip_hex_prefix(s).ok_or_else(|| format!("address must start with 0x: {s}"))?;
    if body.len() != 40 {
        return Err(format!("address must be 40 hex chars, got {}", body.len()));
    }
    let bytes = hex::decode(body).map_err(|e| format!("invalid address hex: {e}"))?;
    let address = Address::from_slice(&bytes);

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(format!("0x{body}"), None)
            .map_err(|_| format!("bad address checksum: {s}"))?;
    }

    Ok(address)
}

/// Canonical EIP-55 form of an address string.
pub fn normalize_address(s: &str) -> Result<String, String> {
    parse_address(s).map(|address| address.to_checksum(None))
}

pub fn parse_signature(s: &str) -> Result<Bytes, String> {
    let s = s.trim();
    let body = strip_hex_prefix(s).unwrap_or(s);
    if body.is_empty() {
        return Err("signature is empty".to_string());
    }
    let bytes = hex::decode(body).map_err(|e| format!("invalid signature hex: {e}"))?;
    Ok(Bytes::from(bytes))
}

pub fn parse_hex_32(s: &str) -> Result<B256, String> {
    let s = s.trim();
    let body = strip_hex_prefix(s).unwrap_or(s);
    let bytes = hex::decode(body).map_err(|e| format!("Invalid hex: {}", e))?;
    if bytes.len() != 32 {
        return Err(format!("Expected 32 bytes, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}
