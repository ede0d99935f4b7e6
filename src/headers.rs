//! Response header block.
//!
//! Headers are kept exactly as the server sent them: keys are case-sensitive,
//! and repeated keys keep every value in the order they arrived.

use std::fmt;

use bytes::Bytes;

/// The header which selects chunked framing of the body.
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";

/// The only transfer coding which changes body framing.
pub const CHUNKED: &str = "chunked";

/// Maximum number of trailing whitespace characters removed from a header value.
const TRAILING_TRIM: usize = 4;

/// Multi-valued, insertion-ordered map of response headers.
///
/// Values are the raw bytes the server sent. ICY servers commonly send
/// Latin-1 station names, so values are not required to be UTF-8.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Bytes)>,
    chunked: bool,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. Existing values for the same key are kept.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        let key = key.into();
        let value = value.into();
        if key == TRANSFER_ENCODING && value == CHUNKED.as_bytes() {
            tracing::debug!("Transfer-Encoding: chunked");
            self.chunked = true;
        }
        self.entries.push((key, value));
    }

    /// The first value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    /// The first value stored for `key`, if it is valid UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Every value stored for `key`, in arrival order.
    pub fn get_all<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a [u8]> + 'k
    where
        'a: 'k,
    {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    /// Whether any value is stored for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Iterate over all headers in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Number of header lines stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no headers are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a `Transfer-Encoding: chunked` header was inserted.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Parse a header block into this map.
    ///
    /// `block` holds `\n`-terminated lines; parsing stops after the first bare
    /// `\r` line, or at the end of `block`. Returns the number of bytes consumed.
    pub fn extend_from_block(&mut self, block: &[u8]) -> usize {
        let mut consumed = 0;
        for line in block.split_inclusive(|&b| b == b'\n') {
            consumed += line.len();
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            if line == b"\r" || line.is_empty() {
                break;
            }

            match parse_header_line(line) {
                Some((key, value)) => self.insert(key, value),
                None => tracing::debug!(
                    line = %String::from_utf8_lossy(line).trim_end(),
                    "ignoring header line without a colon"
                ),
            }
        }
        consumed
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K, V> Extend<(K, V)> for HeaderMap
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMap
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        map.extend(iter);
        map
    }
}

/// Split one header line on its first `:`.
///
/// The key is returned exactly as split. The value keeps its raw bytes, minus
/// leading spaces and tabs and at most four trailing spaces, tabs, CRs or LFs.
pub fn parse_header_line(line: &[u8]) -> Option<(String, Bytes)> {
    let colon = line.iter().position(|&b| b == b':')?;
    let key = String::from_utf8_lossy(&line[..colon]).into_owned();

    let value = &line[colon + 1..];
    let start = value
        .iter()
        .position(|&b| !matches!(b, b' ' | b'\t'))
        .unwrap_or(value.len());
    let value = trim_trailing(&value[start..]);

    Some((key, Bytes::copy_from_slice(value)))
}

fn trim_trailing(value: &[u8]) -> &[u8] {
    let mut end = value.len();
    while value.len() - end < TRAILING_TRIM
        && end > 0
        && matches!(value[end - 1], b' ' | b'\t' | b'\r' | b'\n')
    {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(key: &str, value: &'static [u8]) -> Option<(String, Bytes)> {
        Some((key.to_owned(), Bytes::from_static(value)))
    }

    #[test]
    fn split_and_trim() {
        assert_eq!(
            parse_header_line(b"Content-Type: audio/mpeg\r"),
            line("Content-Type", b"audio/mpeg")
        );
        assert_eq!(
            parse_header_line(b"icy-name:\t \tRadio: One \r"),
            line("icy-name", b"Radio: One")
        );
        assert_eq!(parse_header_line(b"Empty:\r"), line("Empty", b""));
        assert_eq!(parse_header_line(b"no colon here\r"), None);
    }

    #[test]
    fn key_is_not_trimmed() {
        assert_eq!(
            parse_header_line(b" Spaced Key : value\r"),
            line(" Spaced Key ", b"value")
        );
    }

    #[test]
    fn trailing_trim_is_bounded() {
        assert_eq!(trim_trailing(b"value \t\r\n"), b"value");
        assert_eq!(trim_trailing(b"value  \t\r\n"), b"value ");
        assert_eq!(trim_trailing(b"value      "), b"value  ");
        assert_eq!(trim_trailing(b"    "), b"");
        assert_eq!(trim_trailing(b""), b"");
    }

    #[test]
    fn latin1_value_is_kept() {
        let mut headers = HeaderMap::new();
        headers.extend_from_block(b"icy-name: Caf\xe9 Radio\r\n\r\n");

        assert_eq!(headers.get("icy-name"), Some(&b"Caf\xe9 Radio"[..]));
        assert_eq!(headers.get_str("icy-name"), None);
    }

    #[test]
    fn multi_valued() {
        let headers: HeaderMap = [("icy-genre", "Jazz"), ("icy-genre", "Blues"), ("Server", "x")]
            .into_iter()
            .collect();

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get_str("icy-genre"), Some("Jazz"));
        assert_eq!(
            headers.get_all("icy-genre").collect::<Vec<_>>(),
            vec![&b"Jazz"[..], &b"Blues"[..]]
        );
        assert_eq!(headers.get("ICY-GENRE"), None);
        assert!(headers.contains_key("Server"));
        assert!(!headers.is_chunked());
    }

    #[test]
    fn get_outlives_key() {
        let headers: HeaderMap = [("Server", "caster")].into_iter().collect();
        let value = {
            let key = String::from("Server");
            headers.get(&key)
        };
        assert_eq!(value, Some(&b"caster"[..]));
    }

    #[test]
    fn chunked_flag() {
        let mut headers = HeaderMap::new();
        headers.extend_from_block(b"Transfer-Encoding: identity\r\n\r\n");
        assert!(!headers.is_chunked());

        let mut headers = HeaderMap::new();
        headers.extend_from_block(b"Transfer-Encoding:  chunked \r\n\r\n");
        assert!(headers.is_chunked());

        let mut headers = HeaderMap::new();
        headers.extend_from_block(b"transfer-encoding: chunked\r\n\r\n");
        assert!(!headers.is_chunked());

        let mut headers = HeaderMap::new();
        headers.extend_from_block(b"Transfer-Encoding: Chunked\r\n\r\n");
        assert!(!headers.is_chunked());
    }

    #[test]
    fn block_stops_at_blank_line() {
        let block = b"Server: caster\r\nicy-br: 128\r\n\r\nBODY";
        let mut headers = HeaderMap::new();
        let consumed = headers.extend_from_block(block);

        assert_eq!(&block[consumed..], b"BODY");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_str("icy-br"), Some("128"));
    }

    #[test]
    fn empty_block() {
        let mut headers = HeaderMap::new();
        let consumed = headers.extend_from_block(b"\r\nBODY");
        assert_eq!(consumed, 2);
        assert!(headers.is_empty());
    }
}
