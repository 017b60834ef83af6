mod algorithm;
mod cache;

use crate::{utok, Vocabulary, WORD_BOUNDARY};
use cache::FragmentCache;
use regex::Regex;
use std::sync::{Arc, LazyLock};

pub use algorithm::MergeState;

/// 默认最多缓存的词片段数。
pub const DEFAULT_CACHE_CAPACITY: usize = 16384;

/// 预分词正则，按优先级依次尝试：
///
/// 1. `[INST]`、`[/INST]` 形式的大写方括号标签；
/// 2. `<<SYS>>` 形式的双尖括号标签；
/// 3. `<s>` 形式的单尖括号标签；
/// 4. 空白；
/// 5. 一般词。
static PRE_TOKENIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\[/?[A-Z_]+\])|(<<[^>]+>>)|(<[^>]+>)|(\s+)|(\S+)").unwrap()
});

/// 基于词表和合词排名表的 BPE 编解码器。
///
/// 词表只读，片段缓存线程安全，因此可以放在 [`Arc`] 里被多个生成任务同时使用。
pub struct BpeEncoder {
    vocab: Arc<Vocabulary>,
    cache: FragmentCache,
}

impl BpeEncoder {
    #[inline]
    pub fn new(vocab: impl Into<Arc<Vocabulary>>) -> Self {
        Self::with_cache_capacity(vocab, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(vocab: impl Into<Arc<Vocabulary>>, capacity: usize) -> Self {
        Self {
            vocab: vocab.into(),
            cache: FragmentCache::new(capacity),
        }
    }

    #[inline]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// 当前缓存的词片段数。
    #[inline]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// 将文本编码为 token 序列。
    ///
    /// 不在词表中的标签或片段编码为 `<unk>`，编码本身不会失败。
    pub fn encode(&self, text: &str) -> Vec<utok> {
        let mut ans = Vec::new();
        for caps in PRE_TOKENIZE.captures_iter(text) {
            if let Some(tag) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
                ans.push(self.id_or_unk(tag.as_str()));
            } else if let Some(word) = caps.get(5) {
                self.encode_word(word.as_str(), &mut ans);
            }
            // 空白不产生 token
        }
        ans
    }

    /// 将 token 序列解码为文本，没有对应词的序号直接跳过。
    pub fn decode(&self, tokens: &[utok]) -> String {
        let mut ans = String::new();
        for piece in tokens.iter().filter_map(|&t| self.vocab.token(t)) {
            ans.push_str(piece);
        }
        ans
    }

    /// token -> piece
    #[inline]
    pub fn decode_token(&self, token: utok) -> Option<&str> {
        self.vocab.token(token)
    }

    fn encode_word(&self, word: &str, ans: &mut Vec<utok>) {
        let mut marked = String::with_capacity(word.len() + WORD_BOUNDARY.len_utf8());
        if !word.starts_with(WORD_BOUNDARY) {
            marked.push(WORD_BOUNDARY);
        }
        marked.push_str(word);

        // 整词命中则不需要合并
        if let Some(token) = self.vocab.id(&marked) {
            ans.push(token);
            return;
        }
        let pieces = self.bpe(&marked);
        ans.extend(pieces.iter().map(|piece| self.id_or_unk(piece)));
    }

    /// 对加了词首标记的词执行 BPE 合并，结果按词缓存。
    fn bpe(&self, word: &str) -> Arc<[Box<str>]> {
        if let Some(pieces) = self.cache.get(word) {
            return pieces;
        }
        let mut state = self.vocab.begin_merge(word);
        while state.merge() {
            tracing::trace!("bpe {word}: {state}");
        }
        let pieces = state
            .into_pieces()
            .into_iter()
            .map(String::into_boxed_str)
            .collect::<Arc<[_]>>();
        self.cache.insert(word, pieces.clone());
        pieces
    }

    #[inline]
    fn id_or_unk(&self, piece: &str) -> utok {
        self.vocab.id(piece).unwrap_or(self.vocab.unk())
    }
}
