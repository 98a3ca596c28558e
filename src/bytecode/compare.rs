use super::auxdata::strip_auxdata;
use crate::consts::{FULL_MATCH_DIR, PARTIAL_MATCH_DIR};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Identical, including the metadata hash.
    Perfect,
    /// Identical once the auxdata is stripped from both sides.
    Partial,
}

impl MatchTier {
    /// Repository directory the matches of this tier are stored under.
    pub fn directory(&self) -> &'static str {
        match self {
            MatchTier::Perfect => FULL_MATCH_DIR,
            MatchTier::Partial => PARTIAL_MATCH_DIR,
        }
    }
}

/// Region of the deployed bytecode which is filled in at deployment time:
/// an immutable variable or a linked library address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub length: usize,
}

/// Compares the bytecode produced by the compiler with the one deployed on chain.
/// Bytes covered by `deployment_ranges` are ignored on both sides.
pub fn compare(
    recompiled: &[u8],
    onchain: &[u8],
    deployment_ranges: &[ByteRange],
) -> Option<MatchTier> {
    if recompiled.is_empty() || onchain.is_empty() {
        return None;
    }
    if equal_outside(recompiled, onchain, deployment_ranges) {
        return Some(MatchTier::Perfect);
    }
    equal_outside(
        strip_auxdata(recompiled),
        strip_auxdata(onchain),
        deployment_ranges,
    )
    .then_some(MatchTier::Partial)
}

fn equal_outside(left: &[u8], right: &[u8], ranges: &[ByteRange]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut ignored = vec![false; left.len()];
    for range in ranges {
        let end = range.start.saturating_add(range.length).min(left.len());
        if range.start < end {
            ignored[range.start..end].fill(true);
        }
    }
    left.iter()
        .zip(right)
        .zip(ignored)
        .all(|((left, right), ignored)| ignored || left == right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_auxdata(code: &[u8], hash_byte: u8) -> Vec<u8> {
        // {"ipfs": h'1220..'} followed by its length
        let mut bytecode = code.to_vec();
        bytecode.extend_from_slice(&[0xa1, 0x64, b'i', b'p', b'f', b's', 0x58, 0x22, 0x12, 0x20]);
        bytecode.extend_from_slice(&[hash_byte; 32]);
        bytecode.extend_from_slice(&[0x00, 0x2a]);
        bytecode
    }

    /// `PUSH32 <value>` followed by `PUSH1 0x80`.
    fn push32(value: u8) -> Vec<u8> {
        let mut code = vec![0x7f];
        code.extend_from_slice(&[value; 32]);
        code.extend_from_slice(&[0x60, 0x80]);
        code
    }

    #[test]
    fn identical_bytecode_is_perfect() {
        let bytecode = with_auxdata(&[0x60, 0x80], 0x01);

        assert_eq!(Some(MatchTier::Perfect), compare(&bytecode, &bytecode, &[]));
    }

    #[test]
    fn different_metadata_hash_is_partial() {
        let recompiled = with_auxdata(&[0x60, 0x80], 0x01);
        let onchain = with_auxdata(&[0x60, 0x80], 0x02);

        assert_eq!(Some(MatchTier::Partial), compare(&recompiled, &onchain, &[]));
    }

    #[test]
    fn different_code_does_not_match() {
        let recompiled = with_auxdata(&[0x60, 0x80], 0x01);
        let onchain = with_auxdata(&[0x60, 0x40], 0x01);

        assert_eq!(None, compare(&recompiled, &onchain, &[]));
        assert_eq!(None, compare(&[], &[], &[]));
    }

    #[test]
    fn immutable_values_are_ignored() {
        let immutable = [ByteRange {
            start: 1,
            length: 32,
        }];
        let recompiled = with_auxdata(&push32(0x00), 0x01);

        assert_eq!(
            Some(MatchTier::Perfect),
            compare(&recompiled, &with_auxdata(&push32(0xab), 0x01), &immutable)
        );
        assert_eq!(
            Some(MatchTier::Partial),
            compare(&recompiled, &with_auxdata(&push32(0xab), 0x02), &immutable)
        );
        assert_eq!(
            None,
            compare(&recompiled, &with_auxdata(&push32(0xab), 0x01), &[])
        );
    }

    #[test]
    fn bytes_outside_ranges_still_matter() {
        let immutable = [ByteRange {
            start: 1,
            length: 32,
        }];
        let recompiled = with_auxdata(&push32(0x00), 0x01);
        let mut onchain = with_auxdata(&push32(0xab), 0x01);
        onchain[34] = 0x40;

        assert_eq!(None, compare(&recompiled, &onchain, &immutable));
    }

    #[test]
    fn ranges_past_the_end_are_clipped() {
        let bytecode = [0x60, 0x80];
        let ranges = [ByteRange {
            start: 1,
            length: 100,
        }];

        assert_eq!(
            Some(MatchTier::Perfect),
            compare(&bytecode, &[0x60, 0x81], &ranges)
        );
        assert_eq!(None, compare(&bytecode, &[0x60, 0x81, 0x00], &ranges));
    }

    #[test]
    fn tiers_map_to_directories() {
        assert_eq!("full_match", MatchTier::Perfect.directory());
        assert_eq!("partial_match", MatchTier::Partial.directory());
    }
}
