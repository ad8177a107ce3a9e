use encoding_rs::CoderResult;
use encoding_rs::Decoder;
use encoding_rs::UTF_8;

/// Incremental UTF-8 decoder for a chunked response body.
///
/// Chunk boundaries are not character boundaries: a multi-byte sequence cut
/// by the transport stays buffered inside the decoder until the rest of it
/// arrives. Malformed input is replaced with U+FFFD rather than rejected.
pub struct StreamDecoder {
    inner: Decoder,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self {
            inner: UTF_8.new_decoder_with_bom_removal(),
        }
    }
}

impl std::fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecoder").finish_non_exhaustive()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk in streaming mode. Returns whatever text is complete
    /// so far, which may be empty when the chunk only holds a partial
    /// character.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.run(chunk, false)
    }

    /// Flush the carry buffer after the final chunk. An incomplete trailing
    /// sequence comes back as a single replacement character.
    pub fn finish(mut self) -> String {
        self.run(&[], true)
    }

    fn run(&mut self, mut src: &[u8], last: bool) -> String {
        let mut out = String::new();
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len().saturating_add(4));
            out.reserve(needed.max(4));
            let (result, read, _) = self.inner.decode_to_string(src, &mut out, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => return out,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_in_chunks(bytes: &[u8], size: usize) -> Vec<String> {
        let mut decoder = StreamDecoder::new();
        let mut out: Vec<String> = bytes
            .chunks(size)
            .map(|chunk| decoder.decode(chunk))
            .collect();
        out.push(decoder.finish());
        out
    }

    #[test]
    fn single_byte_chunks_reassemble_multibyte_text() {
        let text = "Çözümleyici modülü: ağaç → düğüm 🌳";
        let pieces = decode_in_chunks(text.as_bytes(), 1);

        assert_eq!(pieces.concat(), text);
        // No piece ever holds half a character.
        assert!(pieces.iter().all(|piece| !piece.contains('\u{FFFD}')));
    }

    #[test]
    fn split_emoji_is_held_until_complete() {
        let bytes = "a🌳b".as_bytes();
        let mut decoder = StreamDecoder::new();

        assert_eq!(decoder.decode(&bytes[..3]), "a");
        assert_eq!(decoder.decode(&bytes[3..5]), "🌳");
        assert_eq!(decoder.decode(&bytes[5..]), "b");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn truncated_tail_becomes_replacement_on_finish() {
        let bytes = "ok é".as_bytes();
        let mut decoder = StreamDecoder::new();

        assert_eq!(decoder.decode(&bytes[..bytes.len() - 1]), "ok ");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn leading_bom_is_dropped() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode(b"\xEF\xBB\xBFhello"), "hello");
    }
}
