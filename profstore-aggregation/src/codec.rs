// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns stored blobs into sample graphs and back, and merges them.

use crate::error::{AggregationError, Result};
use crate::normalize::Merger;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use profstore_protobuf as pprof;
use prost::Message;
use serde::Deserialize;
use std::io::{self, Cursor, Read, Write};

const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];
const ZSTD_FRAME_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const ZSTD_LEVEL: i32 = 3;

/// What the bounded merge needs from a profile format.
pub trait ProfileCodec {
    fn decode(&self, data: &[u8]) -> Result<pprof::Profile>;

    fn encode(&self, profile: &pprof::Profile) -> Result<Vec<u8>>;

    /// Combines compatible profiles into one.
    fn merge(&self, profiles: &[pprof::Profile]) -> Result<pprof::Profile>;
}

#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Lz4,
    #[default]
    Zstd,
}

impl Compression {
    /// Recognizes the frame format from its magic number.
    pub fn detect(data: &[u8]) -> Self {
        match data.get(..4) {
            Some(magic) if magic == LZ4_FRAME_MAGIC => Self::Lz4,
            Some(magic) if magic == ZSTD_FRAME_MAGIC => Self::Zstd,
            _ => Self::None,
        }
    }
}

/// pprof over protobuf. Encodes with the configured compression; decodes
/// raw, lz4-framed or zstd-framed input alike.
#[derive(Copy, Clone, Debug, Default)]
pub struct PprofCodec {
    compression: Compression,
}

impl PprofCodec {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match Compression::detect(data) {
            Compression::None => out.extend_from_slice(data),
            Compression::Lz4 => {
                FrameDecoder::new(data).read_to_end(&mut out)?;
            }
            Compression::Zstd => {
                zstd::Decoder::new(Cursor::new(data))?.read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }

    fn compress(&self, encoded: Vec<u8>) -> io::Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(encoded),
            Compression::Lz4 => {
                let mut zipper = FrameEncoder::new(Vec::with_capacity(encoded.len() / 2));
                zipper.write_all(&encoded)?;
                zipper.finish().map_err(io::Error::from)
            }
            Compression::Zstd => {
                let mut zipper = zstd::Encoder::new(Vec::with_capacity(encoded.len() / 2), ZSTD_LEVEL)?;
                zipper.write_all(&encoded)?;
                zipper.finish()
            }
        }
    }
}

impl ProfileCodec for PprofCodec {
    fn decode(&self, data: &[u8]) -> Result<pprof::Profile> {
        let buf = Self::decompress(data)?;
        Ok(pprof::Profile::decode(buf.as_slice())?)
    }

    fn encode(&self, profile: &pprof::Profile) -> Result<Vec<u8>> {
        let mut encoded = Vec::with_capacity(profile.encoded_len());
        profile.encode(&mut encoded)?;
        Ok(self.compress(encoded)?)
    }

    fn merge(&self, profiles: &[pprof::Profile]) -> Result<pprof::Profile> {
        if profiles.is_empty() {
            return Err(AggregationError::Merge("no profiles to merge".into()));
        }
        let mut merger = Merger::new();
        for profile in profiles {
            merger.merge(profile)?;
        }
        merger.finish()
    }
}
