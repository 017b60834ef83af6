//! 这个模块提供词表和合词排名表，构造后只读，可在多个编码调用间无锁共享。

use crate::{utok, VocabSource};
use std::collections::{hash_map::Entry, HashMap};

/// 词表：token 字符串与序号的双向映射，加上合词排名表和三个特殊词。
pub struct Vocabulary {
    /// token 字符串 -> token 序号
    encoder: HashMap<String, utok>,
    /// 所有词的字符串内容，重复的子串只保存一次
    text: Box<str>,
    /// 按 token 序号保存内容在 `text` 中的位置，空洞表示该序号没有对应的词
    slices: Box<[Option<(u32, u32)>]>,
    /// 合词排名表，按左右两片分两级索引，查询时不需要拼接字符串
    ranks: HashMap<Box<str>, HashMap<Box<str>, u32>>,
    /// 有效的合词规则数
    merges_len: usize,
    /// token: <unk>
    unk: utok,
    unk_token: String,
    bos_token: String,
    eos_token: String,
}

impl Vocabulary {
    pub fn new(source: VocabSource) -> Self {
        let VocabSource {
            vocab,
            merges,
            unk_token,
            bos_token,
            eos_token,
        } = source;

        let CompressedVocab { text, slices } = CompressedVocab::new(&vocab);

        let mut ranks = HashMap::<Box<str>, HashMap<Box<str>, u32>>::new();
        let mut merges_len = 0;
        for (rank, merge) in merges.iter().enumerate() {
            // 必须恰好分成两个非空片段，否则跳过
            let mut parts = merge.split(' ').filter(|p| !p.is_empty());
            let (Some(left), Some(right), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            match ranks.entry(left.into()).or_default().entry(right.into()) {
                // 重复的规则以后出现的排名为准
                Entry::Occupied(mut entry) => {
                    tracing::warn!("duplicated merge rule `{left} {right}` at {rank}, overrides {}", entry.get());
                    *entry.get_mut() = rank as _;
                }
                Entry::Vacant(entry) => {
                    entry.insert(rank as _);
                    merges_len += 1;
                }
            }
        }

        let unk = match vocab.get(&unk_token) {
            Some(&id) => id,
            None => {
                tracing::warn!("unknown token `{unk_token}` is not in vocab, fallback to id 0");
                0
            }
        };
        for special in [&bos_token, &eos_token] {
            if !vocab.contains_key(special) {
                tracing::warn!("special token `{special}` is not in vocab");
            }
        }

        Self {
            encoder: vocab,
            text,
            slices,
            ranks,
            merges_len,
            unk,
            unk_token,
            bos_token,
            eos_token,
        }
    }

    /// piece -> token
    #[inline]
    pub fn id(&self, piece: &str) -> Option<utok> {
        self.encoder.get(piece).copied()
    }

    /// token -> piece
    #[inline]
    pub fn token(&self, token: utok) -> Option<&str> {
        let &(off, len) = self.slices.get(token as usize)?.as_ref()?;
        Some(&self.text[off as usize..][..len as usize])
    }

    /// 查询一对相邻片段的合词排名，越小越先合并。
    #[inline]
    pub fn rank(&self, left: &str, right: &str) -> Option<u32> {
        self.ranks.get(left)?.get(right).copied()
    }

    #[inline]
    pub fn unk(&self) -> utok {
        self.unk
    }

    #[inline]
    pub fn unk_token(&self) -> &str {
        &self.unk_token
    }

    #[inline]
    pub fn bos_token(&self) -> &str {
        &self.bos_token
    }

    #[inline]
    pub fn eos_token(&self) -> &str {
        &self.eos_token
    }

    /// 词表中的词数。
    #[inline]
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    #[inline]
    pub fn merges_len(&self) -> usize {
        self.merges_len
    }

    /// 遍历所有 `(序号, 词)`，按序号排列。
    pub fn iter(&self) -> impl Iterator<Item = (utok, &str)> + '_ {
        (0..self.slices.len() as utok).filter_map(|t| self.token(t).map(|s| (t, s)))
    }
}

/// 利用词表中的重复部分压缩词表。
struct CompressedVocab {
    text: Box<str>,
    slices: Box<[Option<(u32, u32)>]>,
}

impl CompressedVocab {
    fn new(vocab: &HashMap<String, utok>) -> Self {
        let size = vocab.values().max().map_or(0, |&max| max as usize + 1);
        let total_len = vocab.keys().map(String::len).sum();
        // 创建字符内容缓存
        let mut slices = vec![None; size];
        let mut text_buf = String::with_capacity(total_len);
        let mut pieces = vocab.iter().collect::<Vec<_>>();
        // 对词按内容长度从长到短排序，因为短的内容有可能是长内容的子串，可以避免重复存储相同内容
        pieces.sort_unstable_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then(a.cmp(b)));
        for (piece, &id) in pieces {
            // 查找子串，若存在则复用，否则将新的内容追加到缓存。
            // 合法 utf-8 子串的首尾必然落在字符边界上，切片不会失败
            let off = memchr::memmem::find(text_buf.as_bytes(), piece.as_bytes()).unwrap_or_else(|| {
                let off = text_buf.len();
                text_buf.push_str(piece);
                off
            });
            slices[id as usize] = Some((off as u32, piece.len() as u32));
        }
        Self {
            text: text_buf.into_boxed_str(),
            slices: slices.into_boxed_slice(),
        }
    }
}
