use bytes::Bytes;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::{
    io::{Cursor, ErrorKind, Read},
    path::{Path, PathBuf},
};

/// Archives inside archives are unpacked up to this depth.
const MAX_ARCHIVE_DEPTH: usize = 3;
/// Upper bound for the content unpacked from a single archive.
const MAX_UNPACKED_SIZE: u64 = 64 * 1024 * 1024;

/// A file as uploaded by the user. The path is informational only,
/// sources are matched by content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFile {
    pub path: Option<String>,
    pub content: Bytes,
}

impl RawFile {
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: Some(path.into()),
            content: content.into(),
        }
    }

    pub fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or("<unnamed>")
    }
}

/// Reads files from the provided paths. Directories are walked recursively.
pub fn read_paths(paths: &[PathBuf]) -> std::io::Result<Vec<RawFile>> {
    let mut files = Vec::new();
    for path in paths {
        read_path(path, &mut files)?;
    }
    Ok(files)
}

fn read_path(path: &Path, files: &mut Vec<RawFile>) -> std::io::Result<()> {
    if path.is_dir() {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();
        for entry in entries {
            read_path(&entry, files)?;
        }
    } else {
        let content = std::fs::read(path)?;
        files.push(RawFile::new(path.to_string_lossy(), content));
    }
    Ok(())
}

/// Unpacks archives and build-info bundles into the files they carry.
/// Anything that cannot be unpacked is kept untouched.
pub fn explode(files: Vec<RawFile>) -> Vec<RawFile> {
    let files = expand_archives(files, 0);
    files.into_iter().flat_map(expand_build_info).collect()
}

pub fn is_archive(content: &[u8]) -> bool {
    is_gzip(content) || is_tar(content) || is_zip(content)
}

fn is_zip(content: &[u8]) -> bool {
    content.starts_with(b"PK\x03\x04")
}

fn is_gzip(content: &[u8]) -> bool {
    content.starts_with(&[0x1f, 0x8b])
}

fn is_tar(content: &[u8]) -> bool {
    content.len() > 262 && &content[257..262] == b"ustar"
}

fn expand_archives(files: Vec<RawFile>, depth: usize) -> Vec<RawFile> {
    let mut result = Vec::with_capacity(files.len());
    for file in files {
        if depth >= MAX_ARCHIVE_DEPTH || !is_archive(&file.content) {
            result.push(file);
            continue;
        }
        match unpack(&file.content, MAX_UNPACKED_SIZE) {
            Ok(unpacked) => {
                log::debug!(
                    "unpacked {} files from archive {}",
                    unpacked.len(),
                    file.display_path()
                );
                result.extend(expand_archives(unpacked, depth + 1))
            }
            Err(err) => {
                log::debug!(
                    "cannot unpack {}, treating as a regular file: {}",
                    file.display_path(),
                    err
                );
                result.push(file)
            }
        }
    }
    result
}

fn unpack(content: &[u8], limit: u64) -> std::io::Result<Vec<RawFile>> {
    if is_zip(content) {
        return unpack_zip(content, limit);
    }
    if is_gzip(content) {
        let decompressed = read_limited(GzDecoder::new(content), limit)?;
        if is_tar(&decompressed) {
            return unpack_tar(&decompressed, limit);
        }
        return Ok(vec![RawFile {
            path: None,
            content: decompressed.into(),
        }]);
    }
    unpack_tar(content, limit)
}

/// Reads at most `limit` bytes, failing if there is more.
fn read_limited(reader: impl Read, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("unpacked content exceeds {limit} bytes"),
        ));
    }
    Ok(data)
}

fn unpack_tar(content: &[u8], mut limit: u64) -> std::io::Result<Vec<RawFile>> {
    let mut archive = tar::Archive::new(content);
    let mut files = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let data = read_limited(entry, limit)?;
        limit -= data.len() as u64;
        files.push(RawFile::new(path, data));
    }
    Ok(files)
}

fn unpack_zip(content: &[u8], mut limit: u64) -> std::io::Result<Vec<RawFile>> {
    let invalid = |err: zip::result::ZipError| std::io::Error::new(ErrorKind::InvalidData, err);
    let mut archive = zip::ZipArchive::new(Cursor::new(content)).map_err(invalid)?;
    let mut files = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(invalid)?;
        if entry.is_dir() {
            continue;
        }
        let path = entry.name().to_string();
        let data = read_limited(entry, limit)?;
        limit -= data.len() as u64;
        files.push(RawFile::new(path, data));
    }
    Ok(files)
}

/// Build-info bundles (e.g. hardhat `build-info/*.json`) keep the compiler
/// input and output of the whole project in one json object.
pub fn is_build_info(value: &Value) -> bool {
    value
        .pointer("/input/sources")
        .map(Value::is_object)
        .unwrap_or_default()
        && value
            .pointer("/output/contracts")
            .map(Value::is_object)
            .unwrap_or_default()
}

fn expand_build_info(file: RawFile) -> Vec<RawFile> {
    let looks_like_object = file
        .content
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .map(|byte| *byte == b'{')
        .unwrap_or_default();
    if !looks_like_object {
        return vec![file];
    }
    let value: Value = match serde_json::from_slice(&file.content) {
        Ok(value) => value,
        Err(_) => return vec![file],
    };
    if !is_build_info(&value) {
        return vec![file];
    }

    let mut files = Vec::new();
    if let Some(sources) = value.pointer("/input/sources").and_then(Value::as_object) {
        for (path, source) in sources {
            if let Some(content) = source.get("content").and_then(Value::as_str) {
                files.push(RawFile::new(path.clone(), content.to_string()));
            }
        }
    }
    if let Some(contracts) = value.pointer("/output/contracts").and_then(Value::as_object) {
        for (path, contracts) in contracts {
            let contracts = match contracts.as_object() {
                Some(contracts) => contracts,
                None => continue,
            };
            for (name, contract) in contracts {
                if let Some(metadata) = contract.get("metadata").and_then(Value::as_str) {
                    files.push(RawFile::new(
                        format!("{path}:{name}/metadata.json"),
                        metadata.to_string(),
                    ));
                }
            }
        }
    }
    log::debug!(
        "build-info {} expanded into {} files",
        file.display_path(),
        files.len()
    );
    files
}
