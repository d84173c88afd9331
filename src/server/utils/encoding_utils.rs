use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// determine the best encoding based on Accept-Encoding header
    /// apple HLS player sends "gzip, deflate" or "identity" and that has to be respected
    ///
    /// codings are weighed by their q-value, q=0 rules a coding out and zstd wins ties
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        let Some(header) = accept_encoding else {
            return Self::None;
        };

        let mut zstd = None;
        let mut gzip = None;
        let mut wildcard = None;
        for (coding, q) in header.split(',').filter_map(parse_coding) {
            match coding.as_str() {
                "zstd" => zstd = Some(q),
                "gzip" | "x-gzip" => gzip = Some(q),
                "*" => wildcard = Some(q),
                _ => {}
            }
        }

        // a wildcard only speaks for codings that weren't named
        let zstd = zstd.or(wildcard).unwrap_or(0.0);
        let gzip = gzip.or(wildcard).unwrap_or(0.0);

        if zstd > 0.0 && zstd >= gzip {
            Self::Zstd
        } else if gzip > 0.0 {
            Self::Gzip
        } else {
            Self::None
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

/// "gzip;q=0.5" -> ("gzip", 0.5), a missing or unparsable q counts as 1
fn parse_coding(token: &str) -> Option<(String, f32)> {
    let mut parts = token.split(';');
    let coding = parts.next()?.trim().to_ascii_lowercase();
    if coding.is_empty() {
        return None;
    }

    let q = parts
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .map(|(_, value)| value.trim().parse::<f32>().unwrap_or(1.0))
        .unwrap_or(1.0);

    Some((coding, q))
}

/// undo an upstream Content-Encoding, unknown encodings are passed through as is
pub fn decode_body(content_encoding: Option<&str>, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    match content_encoding {
        Some("zstd") => zstd::decode_all(bytes),
        Some("gzip") => {
            let mut decoder = GzDecoder::new(bytes);
            let mut decomp = Vec::new();
            decoder.read_to_end(&mut decomp)?;
            Ok(decomp)
        }
        _ => Ok(bytes.to_vec()),
    }
}
