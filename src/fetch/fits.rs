//! Minimal FITS image reader
//!
//! Broker cutouts are small single-image FITS files. This reader walks the
//! header/data units in order and returns the first one whose data, with
//! length-1 axes dropped, is two-dimensional. Tables and compressed images
//! are skipped.
//!
//! Layout reminders:
//! - Headers are 80-byte ASCII cards in 2880-byte blocks, ended by `END`
//! - Data is big-endian and also padded to 2880 bytes
//! - Physical value = BZERO + BSCALE * stored value

use thiserror::Error;

use crate::record::Stamp;

const BLOCK: usize = 2880;
const CARD: usize = 80;

#[derive(Debug, Error, PartialEq)]
pub enum FitsError {
    #[error("Truncated FITS file at byte {0}")]
    Truncated(usize),

    #[error("Missing {0} keyword")]
    MissingKeyword(String),

    #[error("Invalid value for {keyword}: {value}")]
    InvalidValue { keyword: String, value: String },

    #[error("Unsupported BITPIX {0}")]
    UnsupportedBitpix(i64),

    #[error("Gzip-compressed FITS is not supported")]
    Compressed,

    #[error("No 2D image data found")]
    NoImage,
}

/// Parsed header of one HDU
#[derive(Debug, Default)]
struct Header {
    cards: Vec<(String, String)>,
}

impl Header {
    fn raw(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }

    fn int(&self, keyword: &str) -> Result<Option<i64>, FitsError> {
        match self.raw(keyword) {
            None => Ok(None),
            Some(v) => v.parse::<i64>().map(Some).map_err(|_| FitsError::InvalidValue {
                keyword: keyword.to_string(),
                value: v.to_string(),
            }),
        }
    }

    fn required_int(&self, keyword: &str) -> Result<i64, FitsError> {
        self.int(keyword)?
            .ok_or_else(|| FitsError::MissingKeyword(keyword.to_string()))
    }

    fn float(&self, keyword: &str, default: f64) -> Result<f64, FitsError> {
        match self.raw(keyword) {
            None => Ok(default),
            // FITS allows Fortran-style exponents
            Some(v) => v.replace(['D', 'd'], "E").parse::<f64>().map_err(|_| {
                FitsError::InvalidValue {
                    keyword: keyword.to_string(),
                    value: v.to_string(),
                }
            }),
        }
    }

    fn text(&self, keyword: &str) -> Option<&str> {
        self.raw(keyword).map(|v| v.trim_matches('\'').trim())
    }
}

/// Keyword and value of one card; None for comments and blank cards
fn parse_card(card: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(card);
    let keyword = text.get(..8)?.trim().to_string();
    if keyword.is_empty() || text.get(8..10) != Some("= ") {
        return Some((keyword, String::new())).filter(|(k, _)| k == "END");
    }
    let rest = text.get(10..).unwrap_or("").trim();
    let value = if let Some(quoted) = rest.strip_prefix('\'') {
        // string values end at the next single quote; '' is an escaped quote
        let mut out = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        format!("'{}'", out.trim_end())
    } else {
        rest.split('/').next().unwrap_or("").trim().to_string()
    };
    Some((keyword, value))
}

/// Read one header starting at `offset`, returning it and the data offset
fn read_header(bytes: &[u8], mut offset: usize) -> Result<(Header, usize), FitsError> {
    let mut header = Header::default();
    loop {
        let block = bytes
            .get(offset..offset + BLOCK)
            .ok_or(FitsError::Truncated(offset))?;
        offset += BLOCK;

        for card in block.chunks_exact(CARD) {
            match parse_card(card) {
                Some((keyword, _)) if keyword == "END" => return Ok((header, offset)),
                Some(pair) => header.cards.push(pair),
                None => {}
            }
        }
    }
}

fn padded(len: usize) -> Option<usize> {
    len.div_ceil(BLOCK).checked_mul(BLOCK)
}

/// Largest NAXIS the FITS standard allows
const MAX_AXES: i64 = 999;

fn overflow(keyword: &str, value: impl ToString) -> FitsError {
    FitsError::InvalidValue {
        keyword: keyword.to_string(),
        value: value.to_string(),
    }
}

/// Decode the first 2-D image in a FITS file
///
/// Header values are untrusted: sizes that overflow or point past the end
/// of the file are errors, never panics.
pub fn decode_image(bytes: &[u8]) -> Result<Stamp, FitsError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return Err(FitsError::Compressed);
    }

    let mut offset = 0;
    while offset < bytes.len() {
        let (header, data_start) = read_header(bytes, offset)?;

        let bitpix = header.required_int("BITPIX")?;
        let naxis = header.required_int("NAXIS")?;
        if !(0..=MAX_AXES).contains(&naxis) {
            return Err(overflow("NAXIS", naxis));
        }
        let mut axes = Vec::with_capacity(naxis as usize);
        for n in 1..=naxis {
            let keyword = format!("NAXIS{n}");
            let len = header.required_int(&keyword)?;
            let len = usize::try_from(len).map_err(|_| overflow(&keyword, len))?;
            axes.push(len);
        }
        let pcount = header.int("PCOUNT")?.unwrap_or(0).max(0);
        let pcount = usize::try_from(pcount).map_err(|_| overflow("PCOUNT", pcount))?;
        let gcount = header.int("GCOUNT")?.unwrap_or(1).max(1);
        let gcount = usize::try_from(gcount).map_err(|_| overflow("GCOUNT", gcount))?;
        let bytes_per_value = (bitpix.unsigned_abs() / 8) as usize;

        let count = if axes.is_empty() {
            0
        } else {
            axes.iter()
                .try_fold(1usize, |acc, &n| acc.checked_mul(n))
                .ok_or_else(|| overflow("NAXISn", format!("{axes:?}")))?
        };
        let data_len = pcount
            .checked_add(count)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bytes_per_value))
            .ok_or_else(|| overflow("NAXISn", format!("{axes:?}")))?;

        let is_image = match header.text("XTENSION") {
            None => true,
            Some(kind) => kind == "IMAGE",
        };
        let squeezed: Vec<usize> = axes.iter().copied().filter(|&n| n != 1).collect();

        if is_image && squeezed.len() == 2 && count > 0 {
            let width = u32::try_from(squeezed[0]).map_err(|_| overflow("NAXIS1", squeezed[0]))?;
            let height = u32::try_from(squeezed[1]).map_err(|_| overflow("NAXIS2", squeezed[1]))?;
            let image_len = count
                .checked_mul(bytes_per_value)
                .ok_or_else(|| overflow("NAXISn", format!("{axes:?}")))?;
            let data = data_start
                .checked_add(image_len)
                .and_then(|end| bytes.get(data_start..end))
                .ok_or(FitsError::Truncated(data_start))?;
            let pixels = read_pixels(data, bitpix, &header)?;
            tracing::debug!(width, height, bitpix, "Decoded FITS image");
            return Stamp::new(width, height, pixels).ok_or(FitsError::NoImage);
        }

        offset = padded(data_len)
            .and_then(|len| data_start.checked_add(len))
            .ok_or(FitsError::Truncated(data_start))?;
    }
    Err(FitsError::NoImage)
}

fn read_pixels(data: &[u8], bitpix: i64, header: &Header) -> Result<Vec<f32>, FitsError> {
    let bzero = header.float("BZERO", 0.0)?;
    let bscale = header.float("BSCALE", 1.0)?;
    let scale = |v: f64| (bzero + bscale * v) as f32;

    let pixels = match bitpix {
        8 => data.iter().map(|&b| scale(b as f64)).collect(),
        16 => data
            .chunks_exact(2)
            .map(|c| scale(i16::from_be_bytes([c[0], c[1]]) as f64))
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|c| scale(i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64))
            .collect(),
        64 => data
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                scale(i64::from_be_bytes(b) as f64)
            })
            .collect(),
        -32 => data
            .chunks_exact(4)
            .map(|c| scale(f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64))
            .collect(),
        -64 => data
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                scale(f64::from_be_bytes(b))
            })
            .collect(),
        other => return Err(FitsError::UnsupportedBitpix(other)),
    };
    Ok(pixels)
}
