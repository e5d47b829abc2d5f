//! Source Map v3 construction.
//!
//! The generator records raw (generated, source) position pairs on a
//! [`Builder`]; `build` delta-encodes them into the `mappings` field as
//! sign-interleaved base64 VLQ, per the Source Map v3 specification.

use std::collections::HashMap;

use serde::Serialize;

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceMap {
    pub version: u32,
    pub file: String,
    #[serde(rename = "sourceRoot", skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("source map serialization cannot fail")
    }

    /// An inline `data:` URL carrying the whole map.
    pub fn to_base64_url(&self) -> String {
        let json = serde_json::to_string(self).expect("source map serialization cannot fail");
        format!("data:application/json;base64,{}", base64(json.as_bytes()))
    }

    /// The trailing comment pointing the consumer at the map: a file
    /// reference when `map_file` is given, an inline data URL otherwise.
    pub fn comment(&self, map_file: Option<&str>) -> String {
        match map_file {
            Some(file) => format!("--# sourceMappingURL={file}"),
            None => format!("--# sourceMappingURL={}", self.to_base64_url()),
        }
    }
}

/// A single raw position mapping. Lines are 1-based; columns are 0-based on
/// both sides (the generator converts token columns before recording).
#[derive(Clone, Debug, PartialEq)]
struct Mapping {
    generated_line: u32,
    generated_column: u32,
    source_line: u32,
    source_column: u32,
    name: Option<String>,
}

pub struct Builder {
    source_file: String,
    generated_file: String,
    mappings: Vec<Mapping>,
    names: Vec<String>,
    name_indices: HashMap<String, usize>,
}

impl Builder {
    pub fn new(source_file: impl Into<String>, generated_file: impl Into<String>) -> Builder {
        Builder {
            source_file: source_file.into(),
            generated_file: generated_file.into(),
            mappings: Vec::new(),
            names: Vec::new(),
            name_indices: HashMap::new(),
        }
    }

    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source_line: u32,
        source_column: u32,
        name: Option<&str>,
    ) {
        if let Some(name) = name {
            if !self.name_indices.contains_key(name) {
                self.name_indices.insert(name.to_string(), self.names.len());
                self.names.push(name.to_string());
            }
        }
        self.mappings.push(Mapping {
            generated_line,
            generated_column,
            source_line,
            source_column,
            name: name.map(str::to_string),
        });
    }

    pub fn build(&self) -> SourceMap {
        SourceMap {
            version: 3,
            file: self.generated_file.clone(),
            source_root: None,
            sources: vec![self.source_file.clone()],
            names: self.names.clone(),
            mappings: self.encode_mappings(),
        }
    }

    /// Segments are grouped by generated line (`;`), comma-separated within
    /// a line. Each field is delta-encoded against the previous segment;
    /// the generated-column baseline resets at every new line, while the
    /// source line/column deltas persist across lines.
    fn encode_mappings(&self) -> String {
        if self.mappings.is_empty() {
            return String::new();
        }

        let mut result = String::new();
        let mut prev_generated_line: i64 = 0;
        let mut prev_generated_column: i64 = 0;
        let mut prev_source_line: i64 = 0;
        let mut prev_source_column: i64 = 0;
        let mut prev_name_index: i64 = 0;

        for (i, mapping) in self.mappings.iter().enumerate() {
            let mut advanced_line = false;
            while prev_generated_line < i64::from(mapping.generated_line) {
                if prev_generated_line > 0 || i > 0 {
                    result.push(';');
                }
                prev_generated_line += 1;
                prev_generated_column = 0;
                advanced_line = true;
            }
            if i > 0 && !advanced_line {
                result.push(',');
            }

            encode_vlq_into(
                &mut result,
                i64::from(mapping.generated_column) - prev_generated_column,
            );
            prev_generated_column = i64::from(mapping.generated_column);

            // Source file index; a single source per map.
            encode_vlq_into(&mut result, 0);

            let source_line = i64::from(mapping.source_line) - 1;
            encode_vlq_into(&mut result, source_line - prev_source_line);
            prev_source_line = source_line;

            encode_vlq_into(
                &mut result,
                i64::from(mapping.source_column) - prev_source_column,
            );
            prev_source_column = i64::from(mapping.source_column);

            if let Some(name) = &mapping.name {
                let index = self.name_indices[name] as i64;
                encode_vlq_into(&mut result, index - prev_name_index);
                prev_name_index = index;
            }
        }

        result
    }
}

/// Encodes an integer as sign-interleaved base64 VLQ: `(|v| << 1) | sign`,
/// split into 5-bit groups low-to-high with a continuation bit on all but
/// the last.
pub fn encode_vlq(value: i64) -> String {
    let mut out = String::new();
    encode_vlq_into(&mut out, value);
    out
}

fn encode_vlq_into(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Decodes a VLQ base64 value from the front of `encoded`, returning the
/// value and the number of characters consumed.
pub fn decode_vlq(encoded: &str) -> (i64, usize) {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut chars_read = 0;

    for &byte in encoded.as_bytes() {
        chars_read += 1;
        let digit = match byte {
            b'A'..=b'Z' => i64::from(byte - b'A'),
            b'a'..=b'z' => i64::from(byte - b'a') + 26,
            b'0'..=b'9' => i64::from(byte - b'0') + 52,
            b'+' => 62,
            b'/' => 63,
            _ => 0,
        };
        let continuation = digit & VLQ_CONTINUATION_BIT != 0;
        result += (digit & VLQ_BASE_MASK) << shift;
        shift += VLQ_BASE_SHIFT;
        if !continuation {
            break;
        }
    }

    let value = if result & 1 == 1 {
        -(result >> 1)
    } else {
        result >> 1
    };
    (value, chars_read)
}

/// Plain base64 with padding, used for the inline data URL.
fn base64(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b0 = u32::from(chunk[0]);
        let b1 = u32::from(chunk.get(1).copied().unwrap_or(0));
        let b2 = u32::from(chunk.get(2).copied().unwrap_or(0));
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(BASE64_CHARS[(triple >> 18 & 0x3F) as usize] as char);
        out.push(BASE64_CHARS[(triple >> 12 & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            out.push(BASE64_CHARS[(triple >> 6 & 0x3F) as usize] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(BASE64_CHARS[(triple & 0x3F) as usize] as char);
        } else {
            out.push('=');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn vlq_round_trip() {
        for value in -4096..=4096 {
            let encoded = encode_vlq(value);
            let (decoded, consumed) = decode_vlq(&encoded);
            assert_eq!(decoded, value, "round-trip failed for {value}");
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn vlq_known_values() {
        assert_eq!(encode_vlq(0), "A");
        assert_eq!(encode_vlq(1), "C");
        assert_eq!(encode_vlq(-1), "D");
        assert_eq!(encode_vlq(8), "Q");
        assert_eq!(encode_vlq(10), "U");
        assert_eq!(encode_vlq(16), "gB");
    }

    #[test]
    fn alphabet_has_sixty_four_characters() {
        assert_eq!(BASE64_CHARS.len(), 64);
        assert!(BASE64_CHARS.starts_with(b"ABC"));
        assert!(BASE64_CHARS.ends_with(b"9+/"));
    }

    #[test]
    fn builds_document_fields() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, None);
        let map = builder.build();
        assert_eq!(map.version, 3);
        assert_eq!(map.file, "test.lua");
        assert_eq!(map.sources, ["test.lunic"]);
        assert!(map.names.is_empty());
    }

    #[test]
    fn encodes_single_line_segments() {
        // (gen 1,0) <- (src 1,0) and (gen 1,10) <- (src 1,8): the second
        // segment encodes deltas 10, 0, 0, 8.
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, None);
        builder.add_mapping(1, 10, 1, 8, None);
        assert_eq!(builder.build().mappings, "AAAA,UAAQ");
    }

    #[test]
    fn line_breaks_reset_generated_column() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 4, 1, 4, None);
        builder.add_mapping(2, 4, 2, 4, None);
        let mappings = builder.build().mappings;
        assert_eq!(mappings.matches(';').count(), 1);
        // The second segment's generated column is 4 again, not a delta of
        // zero: the baseline reset at the semicolon.
        assert_eq!(mappings, "IAAI;IACA");
    }

    #[test]
    fn multiple_lines_have_semicolons() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, None);
        builder.add_mapping(2, 0, 2, 0, None);
        builder.add_mapping(3, 5, 3, 3, None);
        let mappings = builder.build().mappings;
        assert!(mappings.matches(';').count() >= 2);
    }

    #[test]
    fn names_are_tracked_in_order() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, Some("foo"));
        builder.add_mapping(1, 10, 1, 8, Some("bar"));
        builder.add_mapping(1, 20, 1, 16, Some("foo"));
        let map = builder.build();
        assert_eq!(map.names, ["foo", "bar"]);
    }

    #[test]
    fn empty_builder_emits_empty_mappings() {
        let builder = Builder::new("test.lunic", "test.lua");
        assert_eq!(builder.build().mappings, "");
    }

    #[test]
    fn json_document() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, None);
        let json = builder.build().to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["version"], 3);
        assert_eq!(parsed["file"], "test.lua");
        assert_eq!(parsed["sources"][0], "test.lunic");
        assert!(parsed["mappings"].is_string());
        // No names were recorded, so the field is omitted entirely.
        assert!(parsed.get("names").is_none());
        assert!(parsed.get("sourceRoot").is_none());
    }

    #[test]
    fn comments() {
        let mut builder = Builder::new("test.lunic", "test.lua");
        builder.add_mapping(1, 0, 1, 0, None);
        let map = builder.build();
        assert_eq!(
            map.comment(Some("test.lua.map")),
            "--# sourceMappingURL=test.lua.map"
        );
        assert!(map
            .comment(None)
            .starts_with("--# sourceMappingURL=data:application/json;base64,"));
    }

    #[test]
    fn base64_known_vectors() {
        assert_eq!(base64(b""), "");
        assert_eq!(base64(b"f"), "Zg==");
        assert_eq!(base64(b"fo"), "Zm8=");
        assert_eq!(base64(b"foo"), "Zm9v");
        assert_eq!(base64(b"foobar"), "Zm9vYmFy");
    }
}
