//! Wire encoding for the RouterOS API (spec.md §6): TCP port 8728, a
//! length-prefixed "sentence" of "words" terminated by a zero-length word.

use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum RouterOsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("command trapped: {0}")]
    Trapped(String),
}

pub type RouterOsResult<T> = Result<T, RouterOsError>;

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x4000 {
        let len = len as u32 | 0x8000;
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else if len < 0x20_0000 {
        let len = len as u32 | 0xC0_0000;
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else if len < 0x1000_0000 {
        let len = len as u32 | 0xE000_0000;
        out.push((len >> 24) as u8);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(0xF0);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

async fn read_length(stream: &mut TcpStream) -> RouterOsResult<usize> {
    let first = stream.read_u8().await?;
    if first & 0x80 == 0 {
        Ok(first as usize)
    } else if first & 0xC0 == 0x80 {
        let second = stream.read_u8().await?;
        Ok((((first & 0x3F) as usize) << 8) | second as usize)
    } else if first & 0xE0 == 0xC0 {
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await?;
        Ok((((first & 0x1F) as usize) << 16) | ((buf[0] as usize) << 8) | buf[1] as usize)
    } else if first & 0xF0 == 0xE0 {
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await?;
        Ok((((first & 0x0F) as usize) << 24)
            | ((buf[0] as usize) << 16)
            | ((buf[1] as usize) << 8)
            | buf[2] as usize)
    } else {
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await?;
        Ok(u32::from_be_bytes(buf) as usize)
    }
}

async fn write_word(stream: &mut TcpStream, word: &str) -> RouterOsResult<()> {
    let bytes = word.as_bytes();
    let mut buf = Vec::with_capacity(bytes.len() + 4);
    encode_length(bytes.len(), &mut buf);
    buf.extend_from_slice(bytes);
    stream.write_all(&buf).await?;
    Ok(())
}

pub(super) async fn write_sentence(stream: &mut TcpStream, words: &[String]) -> RouterOsResult<()> {
    for word in words {
        write_word(stream, word).await?;
    }
    write_word(stream, "").await?;
    stream.flush().await?;
    Ok(())
}

pub(super) async fn read_sentence(stream: &mut TcpStream) -> RouterOsResult<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let len = read_length(stream).await?;
        if len == 0 {
            break;
        }
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        words.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(words)
}

/// A single `!re` row, attributes with the leading `=` stripped.
pub type Row = HashMap<String, String>;

pub(super) fn words_to_row(words: &[String]) -> Row {
    let mut row = Row::new();
    for word in words {
        if let Some(rest) = word.strip_prefix('=') {
            if let Some((key, value)) = rest.split_once('=') {
                row.insert(key.to_string(), value.to_string());
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_length_matches_routeros_varint_boundaries() {
        let mut out = Vec::new();
        encode_length(5, &mut out);
        assert_eq!(out, vec![5]);

        let mut out = Vec::new();
        encode_length(200, &mut out);
        assert_eq!(out, vec![0x80 | (200 >> 8) as u8, 200_u8]);
    }

    #[test]
    fn words_to_row_parses_equals_prefixed_attributes() {
        let words = vec![
            "!re".to_string(),
            "=address=10.0.0.2".to_string(),
            "=received=1".to_string(),
            "=avg-rtt=50ms".to_string(),
        ];
        let row = words_to_row(&words);
        assert_eq!(row.get("address").map(String::as_str), Some("10.0.0.2"));
        assert_eq!(row.get("received").map(String::as_str), Some("1"));
        assert_eq!(row.get("avg-rtt").map(String::as_str), Some("50ms"));
    }
}
