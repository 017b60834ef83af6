use crate::Vocabulary;
use std::fmt;
use unicode_segmentation::UnicodeSegmentation;

/// 一个词的合并状态。
///
/// 初始时每个字形簇（grapheme cluster）是一个片段，
/// 每轮合并排名最小的相邻片段对在词中的所有不重叠出现。
pub struct MergeState<'v> {
    vocab: &'v Vocabulary,
    pieces: Vec<String>,
}

impl Vocabulary {
    pub fn begin_merge<'v>(&'v self, word: &str) -> MergeState<'v> {
        MergeState {
            vocab: self,
            pieces: word.graphemes(true).map(String::from).collect(),
        }
    }
}

impl MergeState<'_> {
    /// 尝试执行一轮合并，返回是否成功执行了合并。
    ///
    /// 每轮合并至少使片段数减少 1，因此至多执行 `n - 1` 轮。
    pub fn merge(&mut self) -> bool {
        if self.pieces.len() < 2 {
            return false;
        }
        // 排名表是全序的，最小排名只对应一种片段对
        let Some((_, i)) = self
            .pieces
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| self.vocab.rank(&pair[0], &pair[1]).map(|rank| (rank, i)))
            .min_by_key(|&(rank, _)| rank)
        else {
            return false;
        };
        let first = self.pieces[i].clone();
        let second = self.pieces[i + 1].clone();

        // 从左到右合并该片段对的所有不重叠出现
        let mut merged = Vec::with_capacity(self.pieces.len() - 1);
        let mut pieces = std::mem::take(&mut self.pieces).into_iter().peekable();
        while let Some(mut piece) = pieces.next() {
            if piece == first && pieces.peek() == Some(&second) {
                pieces.next();
                piece.push_str(&second);
            }
            merged.push(piece);
        }
        self.pieces = merged;
        true
    }

    #[inline]
    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }

    #[inline]
    pub fn into_pieces(self) -> Vec<String> {
        self.pieces
    }
}

impl fmt::Display for MergeState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match self.vocab.id(piece) {
                Some(token) => write!(f, "{piece}({token})")?,
                None => write!(f, "{piece}(?)")?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use crate::{vocab::tests::source, Vocabulary};

    fn bpe(vocab: &Vocabulary, word: &str) -> (Vec<String>, usize) {
        let mut state = vocab.begin_merge(word);
        let mut passes = 0;
        while state.merge() {
            passes += 1;
        }
        (state.into_pieces(), passes)
    }

    #[test]
    fn merges_by_rank() {
        let vocab = Vocabulary::new(source());
        // ▁ h -> ▁h, e l -> el, l o -> lo, ▁h el -> ▁hel, ▁hel lo -> ▁hello
        let (pieces, passes) = bpe(&vocab, "▁hello");
        assert_eq!(pieces, ["▁hello"]);
        assert_eq!(passes, 5);
    }

    #[test]
    fn merges_all_occurrences_in_one_pass() {
        let vocab = Vocabulary::new(source());
        // "h e" 的排名最低但仍是唯一可合并的对，两处出现同一轮合并
        let (pieces, passes) = bpe(&vocab, "hehe");
        assert_eq!(pieces, ["he", "he"]);
        assert_eq!(passes, 1);
    }

    #[test]
    fn overlapping_pairs_merge_left_to_right() {
        let vocab = Vocabulary::new(source());
        let (pieces, _) = bpe(&vocab, "lll");
        assert_eq!(pieces, ["ll", "l"]);
    }

    #[test]
    fn terminates_and_never_grows() {
        let vocab = Vocabulary::new(source());
        for word in ["▁hello", "▁world", "hellohello", "▁", "éèê", "▁héllo!"] {
            let n = vocab.begin_merge(word).pieces().len();
            let (pieces, passes) = bpe(&vocab, word);
            assert!(pieces.len() <= n);
            assert!(passes <= n.saturating_sub(1));
            assert_eq!(pieces.concat(), word);
        }
    }

    #[test]
    fn unmergeable_word_is_unchanged() {
        let vocab = Vocabulary::new(source());
        for _ in 0..2 {
            let (pieces, passes) = bpe(&vocab, "wrd");
            assert_eq!(pieces, ["w", "r", "d"]);
            assert_eq!(passes, 0);
        }
        let (pieces, passes) = bpe(&vocab, "x");
        assert_eq!(pieces, ["x"]);
        assert_eq!(passes, 0);
        assert!(bpe(&vocab, "").0.is_empty());
    }

    #[test]
    fn splits_by_grapheme() {
        let vocab = Vocabulary::new(source());
        // e + 组合重音符是一个字形簇
        let state = vocab.begin_merge("▁e\u{301}l");
        assert_eq!(state.pieces(), ["▁", "e\u{301}", "l"]);
        assert_eq!(state.to_string(), "[▁(5) e\u{301}(?) l(8)]");
    }
}
