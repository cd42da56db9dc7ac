//! Streaming `application/x-www-form-urlencoded` decoder

use super::AssemblyError;
use crate::http::decode_component;

/// Splits `key=value&...` pairs as bytes arrive. A pair is emitted once its
/// terminating `&` has been seen; the last pair is emitted by [`finish`].
///
/// [`finish`]: UrlEncodedDecoder::finish
#[derive(Debug, Default)]
pub struct UrlEncodedDecoder {
    pending: Vec<u8>,
}

impl UrlEncodedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every pair it completed
    pub fn offer(&mut self, chunk: &[u8]) -> Result<Vec<(String, String)>, AssemblyError> {
        self.pending.extend_from_slice(chunk);

        let Some(last) = self.pending.iter().rposition(|b| *b == b'&') else {
            return Ok(Vec::new());
        };
        let complete: Vec<u8> = self.pending.drain(..=last).collect();
        decode_pairs(&complete)
    }

    /// Flush whatever follows the last `&`
    pub fn finish(&mut self) -> Result<Vec<(String, String)>, AssemblyError> {
        let rest = std::mem::take(&mut self.pending);
        decode_pairs(&rest)
    }
}

fn decode_pairs(raw: &[u8]) -> Result<Vec<(String, String)>, AssemblyError> {
    let mut pairs = Vec::new();
    for pair in raw.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &[][..]),
        };
        let key = decode_component(key)
            .ok_or_else(|| AssemblyError::Decode("form field name is not valid UTF-8".into()))?;
        if key.is_empty() {
            continue;
        }
        let value = decode_component(value).ok_or_else(|| {
            AssemblyError::Decode(format!("value of form field '{}' is not valid UTF-8", key))
        })?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_across_chunks() {
        let mut decoder = UrlEncodedDecoder::new();
        let mut pairs = decoder.offer(b"name=J").unwrap();
        assert!(pairs.is_empty());

        pairs.extend(decoder.offer(b"ohn+Doe&ag").unwrap());
        assert_eq!(pairs, vec![("name".to_string(), "John Doe".to_string())]);

        pairs.extend(decoder.offer(b"e=42&flag").unwrap());
        pairs.extend(decoder.finish().unwrap());
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "John Doe".to_string()),
                ("age".to_string(), "42".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_empty_keys_and_pairs_skipped() {
        let mut decoder = UrlEncodedDecoder::new();
        let pairs = decoder.offer(b"&&=orphan&a%5Bx%5D=1&").unwrap();
        assert_eq!(pairs, vec![("a[x]".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let mut decoder = UrlEncodedDecoder::new();
        decoder.offer(b"k=%FF").unwrap();
        assert!(matches!(decoder.finish(), Err(AssemblyError::Decode(_))));
    }
}
