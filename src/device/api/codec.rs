//! RouterOS API sentence codec.
//!
//! A sentence is a sequence of words terminated by an empty word. Every word
//! is prefixed with its length in a 1–5 byte variable-length encoding:
//!
//! | Length            | Encoding                       |
//! |-------------------|--------------------------------|
//! | `< 0x80`          | 1 byte                         |
//! | `< 0x4000`        | 2 bytes, `len \| 0x8000`       |
//! | `< 0x20_0000`     | 3 bytes, `len \| 0xC0_0000`    |
//! | `< 0x1000_0000`   | 4 bytes, `len \| 0xE000_0000`  |
//! | otherwise         | `0xF0` + 4 bytes               |

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::device::DeviceRecord;

/// Upper bound for a single word; anything larger is treated as corruption.
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Append the encoded length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    let len = len as u32;
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x4000 {
        out.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        out.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        out.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        out.push(0xF0);
        out.extend_from_slice(&len.to_be_bytes());
    }
}

/// Encode a full sentence, including the terminating empty word.
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        encode_length(bytes.len(), &mut out);
        out.extend_from_slice(bytes);
    }
    out.push(0);
    out
}

/// Read one length prefix.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<usize> {
    let first = reader.read_u8().await? as u32;
    let (extra, initial) = if first & 0x80 == 0 {
        (0, first)
    } else if first & 0xC0 == 0x80 {
        (1, first & !0xC0)
    } else if first & 0xE0 == 0xC0 {
        (2, first & !0xE0)
    } else if first & 0xF0 == 0xE0 {
        (3, first & !0xF0)
    } else if first == 0xF0 {
        (4, 0)
    } else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid word length prefix 0x{first:02x}"),
        ));
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | reader.read_u8().await? as u32;
    }
    Ok(len as usize)
}

/// Read one sentence (without the terminating empty word).
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("word length {len} exceeds limit"),
            ));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        words.push(String::from_utf8_lossy(&buf).into_owned());
    }
}

/// Write one sentence and flush.
pub async fn write_sentence<W, S>(writer: &mut W, words: &[S]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    writer.write_all(&encode_sentence(words)).await?;
    writer.flush().await
}

/// Split an attribute word `=key=value` into its parts.
///
/// The value may itself contain `=`.
pub fn parse_attribute(word: &str) -> Option<(&str, &str)> {
    let rest = word.strip_prefix('=')?;
    match rest.split_once('=') {
        Some((key, value)) => Some((key, value)),
        None => Some((rest, "")),
    }
}

/// A decoded reply sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `!re`: one data record.
    Re(DeviceRecord),
    /// `!done`: end of the reply; may carry attributes (e.g. `=ret=`).
    Done(DeviceRecord),
    /// `!trap`: the command failed.
    Trap(String),
    /// `!fatal`: the device is closing the session.
    Fatal(String),
    /// `!empty`: the command produced no records.
    Empty,
}

impl Reply {
    /// Classify a sentence read from the device.
    pub fn parse(words: &[String]) -> io::Result<Self> {
        let Some((kind, rest)) = words.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty sentence"));
        };

        let attributes = || -> DeviceRecord {
            rest.iter()
                .filter_map(|w| parse_attribute(w))
                .collect()
        };

        match kind.as_str() {
            "!re" => Ok(Self::Re(attributes())),
            "!done" => Ok(Self::Done(attributes())),
            "!empty" => Ok(Self::Empty),
            "!trap" => {
                let attrs = attributes();
                Ok(Self::Trap(
                    attrs.get("message").unwrap_or("unknown error").to_string(),
                ))
            }
            "!fatal" => Ok(Self::Fatal(rest.join(" "))),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply word '{other}'"),
            )),
        }
    }
}
