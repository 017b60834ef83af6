#![deny(warnings)]

mod bpe;
mod cleanup;
mod decoding;
mod error;
mod generate;
mod model;
mod prompt;
mod source;
mod vocab;

pub use bpe::{BpeEncoder, MergeState, DEFAULT_CACHE_CAPACITY};
pub use cleanup::clean_generated_text;
pub use decoding::{DecodingAlgorithm, DecodingStrategy, Greedy, TopK, DEFAULT_TOP_K};
pub use error::{BoxError, Error, Result};
pub use generate::{Generation, GenerationParameters, StopReason, TextGenerator};
pub use model::{ModelActor, ModelInference, Precision};
pub use prompt::{format_messages, Message, Role};
pub use source::VocabSource;
pub use tokio_util::sync::CancellationToken;
pub use vocab::Vocabulary;

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// Word-boundary marker prepended to every general word before lookup.
pub const WORD_BOUNDARY: char = '▁';

const fn as_byte_token(piece: &[u8]) -> Option<u8> {
    // 按结构分解并转换
    match piece {
        &[b'<', b'0', b'x', a, b, b'>'] if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => {
            // ascii 转数字
            #[inline(always)]
            const fn to_num(c: u8) -> u8 {
                match c {
                    b'0'..=b'9' => c - b'0',
                    b'a'..=b'f' => c - b'a' + 10,
                    b'A'..=b'F' => c - b'A' + 10,
                    _ => unreachable!(),
                }
            }

            Some(to_num(a) * 16 + to_num(b))
        }
        _ => None,
    }
}

#[test]
fn test_as_byte_token() {
    assert_eq!(as_byte_token(b"<0x0A>"), Some(b'\n'));
    assert_eq!(as_byte_token(b"<0xe2>"), Some(0xe2));
    assert_eq!(as_byte_token(b"<0xZZ>"), None);
    assert_eq!(as_byte_token(b"<s>"), None);
}
