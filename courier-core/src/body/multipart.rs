//! Streaming `multipart/form-data` decoder
//!
//! Bytes can be offered in chunks of any size; a delimiter, a header block
//! or a field name split across chunks decodes the same as when it arrives
//! whole. File parts are streamed into an [`UploadSink`] as they arrive,
//! field parts are buffered until their closing delimiter.

use std::collections::HashMap;

use super::form::{FileUpload, UploadSink};
use super::AssemblyError;
use crate::config::FilesConfig;

/// Largest accepted header block of a single part
const MAX_PART_HEADER_SIZE: usize = 16 * 1024;

/// RFC 2046 boundary length limit
const MAX_BOUNDARY_LEN: usize = 70;

/// A completed part
#[derive(Debug)]
pub enum Part {
    Field { name: String, value: String },
    File(FileUpload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterBoundary,
    Headers,
    Body,
    Epilogue,
}

enum PartTarget {
    Field { name: String, data: Vec<u8> },
    File(UploadSink),
}

pub struct MultipartDecoder {
    /// `\r\n--boundary`
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
    state: State,
    current: Option<PartTarget>,
    config: FilesConfig,
}

impl MultipartDecoder {
    pub fn new(boundary: &str, config: &FilesConfig) -> Result<Self, AssemblyError> {
        if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
            return Err(AssemblyError::Decode(format!(
                "multipart boundary must be 1 to {} characters",
                MAX_BOUNDARY_LEN
            )));
        }

        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());

        Ok(Self {
            delimiter,
            // The first delimiter has no leading line break; seed one.
            buffer: b"\r\n".to_vec(),
            state: State::Preamble,
            current: None,
            config: config.clone(),
        })
    }

    /// Feed a chunk and return every part it completed
    pub fn offer(&mut self, chunk: &[u8]) -> Result<Vec<Part>, AssemblyError> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            let progressed = match self.state {
                State::Preamble => self.skip_preamble(),
                State::AfterBoundary => self.after_boundary()?,
                State::Headers => self.read_headers()?,
                State::Body => self.read_body(&mut parts)?,
                State::Epilogue => {
                    self.buffer.clear();
                    false
                }
            };
            if !progressed {
                return Ok(parts);
            }
        }
    }

    /// Verify the closing delimiter was seen
    pub fn finish(&mut self) -> Result<Vec<Part>, AssemblyError> {
        if self.state != State::Epilogue {
            self.current = None;
            return Err(AssemblyError::Decode(
                "multipart body ended before the closing boundary".to_string(),
            ));
        }
        Ok(Vec::new())
    }

    fn skip_preamble(&mut self) -> bool {
        match find(&self.buffer, &self.delimiter) {
            Some(at) => {
                self.buffer.drain(..at + self.delimiter.len());
                self.state = State::AfterBoundary;
                true
            }
            None => {
                let keep = self.delimiter.len() - 1;
                if self.buffer.len() > keep {
                    self.buffer.drain(..self.buffer.len() - keep);
                }
                false
            }
        }
    }

    fn after_boundary(&mut self) -> Result<bool, AssemblyError> {
        if self.buffer.starts_with(b"--") {
            self.buffer.clear();
            self.state = State::Epilogue;
            return Ok(true);
        }
        // transport padding may sit between the boundary and its CRLF
        let padding = self.buffer.iter().take_while(|b| matches!(b, b' ' | b'\t')).count();
        self.buffer.drain(..padding);
        if self.buffer.len() < 2 {
            return Ok(false);
        }
        if !self.buffer.starts_with(b"\r\n") {
            return Err(AssemblyError::Decode("malformed multipart delimiter line".to_string()));
        }
        self.buffer.drain(..2);
        self.state = State::Headers;
        Ok(true)
    }

    fn read_headers(&mut self) -> Result<bool, AssemblyError> {
        let (block_len, consumed) = if self.buffer.starts_with(b"\r\n") {
            (0, 2)
        } else {
            match find(&self.buffer, b"\r\n\r\n") {
                Some(at) => (at, at + 4),
                None => {
                    if self.buffer.len() > MAX_PART_HEADER_SIZE {
                        return Err(AssemblyError::Decode(
                            "multipart part headers too large".to_string(),
                        ));
                    }
                    return Ok(false);
                }
            }
        };

        let block = String::from_utf8_lossy(&self.buffer[..block_len]).into_owned();
        self.buffer.drain(..consumed);

        let headers: HashMap<String, String> = block
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        let disposition = headers.get("content-disposition").ok_or_else(|| {
            AssemblyError::Decode("multipart part without Content-Disposition".to_string())
        })?;
        let params = disposition_params(disposition);
        let name = params
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned()
            .ok_or_else(|| AssemblyError::Decode("multipart part without a name".to_string()))?;

        self.current = Some(match params.get("filename") {
            Some(file_name) => PartTarget::File(UploadSink::new(
                name,
                file_name.clone(),
                headers.get("content-type").cloned(),
                &self.config,
            )),
            None => PartTarget::Field { name, data: Vec::new() },
        });
        self.state = State::Body;
        Ok(true)
    }

    fn read_body(&mut self, parts: &mut Vec<Part>) -> Result<bool, AssemblyError> {
        match find(&self.buffer, &self.delimiter) {
            Some(at) => {
                let data: Vec<u8> = self.buffer.drain(..at).collect();
                self.buffer.drain(..self.delimiter.len());
                self.write_current(&data)?;
                if let Some(part) = self.complete_current()? {
                    parts.push(part);
                }
                self.state = State::AfterBoundary;
                Ok(true)
            }
            None => {
                // Hold back a possible partial delimiter
                let keep = self.delimiter.len() - 1;
                if self.buffer.len() > keep {
                    let data: Vec<u8> = self.buffer.drain(..self.buffer.len() - keep).collect();
                    self.write_current(&data)?;
                }
                Ok(false)
            }
        }
    }

    fn write_current(&mut self, data: &[u8]) -> Result<(), AssemblyError> {
        match &mut self.current {
            Some(PartTarget::Field { data: buffer, .. }) => buffer.extend_from_slice(data),
            Some(PartTarget::File(sink)) => sink.write(data)?,
            None => {}
        }
        Ok(())
    }

    fn complete_current(&mut self) -> Result<Option<Part>, AssemblyError> {
        let part = match self.current.take() {
            Some(PartTarget::Field { name, data }) => {
                Some(Part::Field { name, value: String::from_utf8_lossy(&data).into_owned() })
            }
            Some(PartTarget::File(sink)) => Some(Part::File(sink.finish()?)),
            None => None,
        };
        Ok(part)
    }
}

/// Parameters of a `Content-Disposition` value; quoted values may contain `;`
fn disposition_params(value: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);

    for piece in pieces.iter().skip(1) {
        if let Some((key, raw)) = piece.split_once('=') {
            let raw = raw.trim();
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(raw);
            params.insert(key.trim().to_ascii_lowercase(), unquoted.to_string());
        }
    }
    params
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"preamble\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
Hello; world\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"a;b.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
line one\r\nline two\r\n\
--XyZ--\r\nepilogue";

    fn decode_in_chunks(body: &[u8], size: usize) -> Vec<Part> {
        let mut decoder = MultipartDecoder::new("XyZ", &FilesConfig::default()).unwrap();
        let mut parts = Vec::new();
        for chunk in body.chunks(size) {
            parts.extend(decoder.offer(chunk).unwrap());
        }
        parts.extend(decoder.finish().unwrap());
        parts
    }

    fn summarize(parts: &[Part]) -> Vec<String> {
        parts
            .iter()
            .map(|part| match part {
                Part::Field { name, value } => format!("field {}={}", name, value),
                Part::File(file) => format!(
                    "file {} {} {:?} {}",
                    file.field(),
                    file.file_name(),
                    file.content_type(),
                    String::from_utf8_lossy(&file.bytes().unwrap())
                ),
            })
            .collect()
    }

    #[test]
    fn test_single_chunk() {
        let parts = summarize(&decode_in_chunks(BODY, BODY.len()));
        assert_eq!(
            parts,
            vec![
                "field title=Hello; world".to_string(),
                "file doc a;b.txt Some(\"text/plain\") line one\r\nline two".to_string(),
            ]
        );
    }

    #[test]
    fn test_every_chunk_size_decodes_identically() {
        let expected = summarize(&decode_in_chunks(BODY, BODY.len()));
        for size in 1..BODY.len() {
            assert_eq!(summarize(&decode_in_chunks(BODY, size)), expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_every_split_point_decodes_identically() {
        let expected = summarize(&decode_in_chunks(BODY, BODY.len()));
        for split in 1..BODY.len() {
            let mut decoder = MultipartDecoder::new("XyZ", &FilesConfig::default()).unwrap();
            let mut parts = decoder.offer(&BODY[..split]).unwrap();
            parts.extend(decoder.offer(&BODY[split..]).unwrap());
            parts.extend(decoder.finish().unwrap());
            assert_eq!(summarize(&parts), expected, "split at {}", split);
        }
    }

    #[test]
    fn test_transport_padding_after_boundary() {
        let expected = summarize(&decode_in_chunks(BODY, BODY.len()));
        let padded = String::from_utf8_lossy(BODY).replace("--XyZ\r\n", "--XyZ \t \r\n").into_bytes();
        for size in 1..padded.len() {
            assert_eq!(summarize(&decode_in_chunks(&padded, size)), expected, "chunk size {}", size);
        }

        let mut decoder = MultipartDecoder::new("b", &FilesConfig::default()).unwrap();
        assert!(matches!(decoder.offer(b"--b  x\r\n"), Err(AssemblyError::Decode(_))));
    }

    #[test]
    fn test_unterminated_body_fails() {
        let mut decoder = MultipartDecoder::new("XyZ", &FilesConfig::default()).unwrap();
        decoder.offer(&BODY[..60]).unwrap();
        assert!(matches!(decoder.finish(), Err(AssemblyError::Decode(_))));
    }

    #[test]
    fn test_part_without_name_fails() {
        let mut decoder = MultipartDecoder::new("b", &FilesConfig::default()).unwrap();
        let result =
            decoder.offer(b"--b\r\nContent-Disposition: form-data; filename=\"x\"\r\n\r\nx\r\n--b--");
        assert!(matches!(result, Err(AssemblyError::Decode(_))));
    }

    #[test]
    fn test_boundary_length() {
        let config = FilesConfig::default();
        assert!(MultipartDecoder::new("", &config).is_err());
        assert!(MultipartDecoder::new(&"a".repeat(71), &config).is_err());
        assert!(MultipartDecoder::new(&"a".repeat(70), &config).is_ok());
    }

    #[test]
    fn test_large_file_spills_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = FilesConfig {
            memory_threshold: 8,
            temp_directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"big\"\r\n\r\n"
            .to_vec();
        body.extend(std::iter::repeat(b'x').take(100));
        body.extend_from_slice(b"\r\n--b--\r\n");

        let mut decoder = MultipartDecoder::new("b", &config).unwrap();
        let mut parts = Vec::new();
        for chunk in body.chunks(7) {
            parts.extend(decoder.offer(chunk).unwrap());
        }
        decoder.finish().unwrap();

        match parts.as_slice() {
            [Part::File(file)] => {
                assert!(file.path().is_some());
                assert_eq!(file.len(), 100);
                assert_eq!(file.bytes().unwrap().len(), 100);
            }
            other => panic!("unexpected parts: {:?}", other),
        }
    }
}
