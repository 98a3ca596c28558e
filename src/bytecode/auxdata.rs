use minicbor::{data::Type, Decoder};
use std::path::PathBuf;
use thiserror::Error;

/// Content address of the metadata file, embedded into the auxdata
/// of the deployed bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetadataPointer {
    /// Base58 encoded CID.
    Ipfs(String),
    /// Hex encoded swarm hash.
    Bzzr0(String),
    Bzzr1(String),
}

impl MetadataPointer {
    /// Path of the content-addressed copy relative to the repository root.
    pub fn repository_path(&self) -> PathBuf {
        match self {
            MetadataPointer::Ipfs(cid) => PathBuf::from("ipfs").join(cid),
            MetadataPointer::Bzzr0(hash) => PathBuf::from("swarm/bzzr0").join(hash),
            MetadataPointer::Bzzr1(hash) => PathBuf::from("swarm/bzzr1").join(hash),
        }
    }
}

#[derive(Error, Debug)]
pub enum NoReferenceFound {
    #[error("bytecode is too short to contain auxdata")]
    TooShort,
    #[error("encoded auxdata length {length} does not fit the bytecode of {bytecode_length} bytes")]
    InvalidLength {
        length: usize,
        bytecode_length: usize,
    },
    #[error("auxdata is not a valid cbor map: {0}")]
    Cbor(#[from] minicbor::decode::Error),
    #[error("auxdata map has indefinite length")]
    IndefiniteMap,
    #[error("auxdata contains no metadata hash")]
    NoMetadataHash,
}

/// Splits bytecode into the code itself and the cbor encoded auxdata.
/// The last two bytes keep the big-endian length of the auxdata.
fn split_auxdata(bytecode: &[u8]) -> Result<(&[u8], &[u8]), NoReferenceFound> {
    if bytecode.len() < 2 {
        return Err(NoReferenceFound::TooShort);
    }
    let (rest, encoded_length) = bytecode.split_at(bytecode.len() - 2);
    let length = u16::from_be_bytes([encoded_length[0], encoded_length[1]]) as usize;
    if length == 0 || length > rest.len() {
        return Err(NoReferenceFound::InvalidLength {
            length,
            bytecode_length: bytecode.len(),
        });
    }
    Ok(rest.split_at(rest.len() - length))
}

/// Finds the metadata hash in the auxdata. Swarm hashes take priority
/// over the ipfs one.
pub fn locate_metadata_reference(bytecode: &[u8]) -> Result<MetadataPointer, NoReferenceFound> {
    let (_, auxdata) = split_auxdata(bytecode)?;
    let mut decoder = Decoder::new(auxdata);
    let entries = decoder.map()?.ok_or(NoReferenceFound::IndefiniteMap)?;

    let (mut bzzr0, mut bzzr1, mut ipfs) = (None, None, None);
    for _ in 0..entries {
        let key = decoder.str()?;
        let slot = match key {
            "bzzr0" => &mut bzzr0,
            "bzzr1" => &mut bzzr1,
            "ipfs" => &mut ipfs,
            _ => {
                decoder.skip()?;
                continue;
            }
        };
        if decoder.datatype()? == Type::Bytes {
            *slot = Some(decoder.bytes()?);
        } else {
            decoder.skip()?;
        }
    }

    if let Some(hash) = bzzr0 {
        return Ok(MetadataPointer::Bzzr0(hex::encode(hash)));
    }
    if let Some(hash) = bzzr1 {
        return Ok(MetadataPointer::Bzzr1(hex::encode(hash)));
    }
    if let Some(multihash) = ipfs {
        return Ok(MetadataPointer::Ipfs(bs58::encode(multihash).into_string()));
    }
    Err(NoReferenceFound::NoMetadataHash)
}

/// Returns the bytecode without its auxdata, or the whole bytecode
/// if it has no decodable auxdata.
pub fn strip_auxdata(bytecode: &[u8]) -> &[u8] {
    match split_auxdata(bytecode) {
        Ok((code, auxdata)) if Decoder::new(auxdata).map().is_ok() => code,
        _ => bytecode,
    }
}
