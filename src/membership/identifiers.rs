//! Identifier helpers.
//!
//! Entities are identified towards callers by their distinguished name,
//! percent-encoded so it survives being used as a URL path segment. Active
//! Directory deployments may instead hand out security identifiers (SIDs) or
//! `objectGUID` values; this module converts between those forms.

use crate::error::{ConnectorError, ConnectorResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::fmt;
use std::str::FromStr;

/// Percent-decode an identifier received from a caller.
pub fn decode_id(id: &str) -> ConnectorResult<String> {
    urlencoding::decode(id)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ConnectorError::invalid_request(format!("identifier '{}' is not valid UTF-8 once decoded", id)))
}

/// Percent-encode an identifier handed back to a caller.
pub fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// A Windows security identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Decode the binary `objectSid` representation.
    ///
    /// Layout: revision (1 byte), sub-authority count (1 byte), identifier
    /// authority (6 bytes, big-endian), then each sub-authority as a
    /// little-endian `u32`.
    pub fn from_bytes(bytes: &[u8]) -> ConnectorResult<Self> {
        let invalid = || ConnectorError::invalid_request("malformed binary security identifier");

        if bytes.len() < 8 {
            return Err(invalid());
        }
        let revision = bytes[0];
        let count = bytes[1] as usize;
        if bytes.len() != 8 + count * 4 {
            return Err(invalid());
        }

        let authority = bytes[2..8]
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        let sub_authorities = bytes[8..]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }

    /// Encode into the binary `objectSid` representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.sub_authorities.len() * 4);
        bytes.push(self.revision);
        bytes.push(self.sub_authorities.len() as u8);
        bytes.extend_from_slice(&self.authority.to_be_bytes()[2..]);
        for sub in &self.sub_authorities {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }
        bytes
    }
}

impl FromStr for Sid {
    type Err = ConnectorError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ConnectorError::invalid_request(format!("'{}' is not a valid security identifier", text))
        };

        let mut parts = text.trim().split('-');
        if !parts.next().is_some_and(|prefix| prefix.eq_ignore_ascii_case("S")) {
            return Err(invalid());
        }
        let revision = parts
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(invalid)?;
        let authority = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .filter(|a| *a < (1u64 << 48))
            .ok_or_else(invalid)?;
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<ConnectorResult<Vec<u32>>>()?;
        if sub_authorities.len() > 15 {
            return Err(invalid());
        }

        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

/// Hex form of a base64 encoded `objectGUID`, as used in `<GUID=...>` search bases.
pub fn guid_to_hex(guid: &str) -> ConnectorResult<String> {
    let bytes = STANDARD.decode(guid.trim()).map_err(|_| {
        ConnectorError::invalid_request(format!("'{}' is not a base64 encoded objectGUID", guid))
    })?;
    if bytes.len() != 16 {
        return Err(ConnectorError::invalid_request(format!(
            "objectGUID '{}' must be 16 bytes",
            guid
        )));
    }
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}
