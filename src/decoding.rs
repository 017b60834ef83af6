//! 解码策略：从一步的 logits 中选出下一个 token。

use crate::utok;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;

/// 未指定时 Top-K 采样的 k。
pub const DEFAULT_TOP_K: usize = 10;

/// 根据最后一个位置的 logits 选择下一个 token。
///
/// logits 为空时返回 `None`。
pub trait DecodingStrategy {
    fn next_token(&mut self, logits: &[f32]) -> Option<utok>;
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize)]
pub enum DecodingAlgorithm {
    #[default]
    #[serde(rename = "greedy", alias = "Greedy")]
    Greedy,
    #[serde(rename = "topK", alias = "TopK")]
    TopK,
}

/// 贪心解码：取最大值，相等时取最靠前的。
#[derive(Clone, Copy, Default, Debug)]
pub struct Greedy;

impl DecodingStrategy for Greedy {
    fn next_token(&mut self, logits: &[f32]) -> Option<utok> {
        if logits.is_empty() {
            return None;
        }
        let mut max = f32::NEG_INFINITY;
        let mut ans = 0;
        for (i, &logit) in logits.iter().enumerate() {
            // 只在严格大于时替换，相等的值保留第一次出现
            if logit > max {
                max = logit;
                ans = i;
            }
        }
        Some(ans as _)
    }
}

/// Top-K 采样：在 logits 最大的 k 个 token 上做 softmax 后按概率抽样。
pub struct TopK<R = StdRng> {
    k: usize,
    rng: R,
}

impl TopK {
    /// 使用系统熵初始化随机源。
    pub fn new(k: usize) -> Self {
        Self::with_rng(k, StdRng::from_entropy())
    }

    /// 使用固定种子，采样结果可复现。
    pub fn seeded(k: usize, seed: u64) -> Self {
        Self::with_rng(k, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TopK<R> {
    pub fn with_rng(k: usize, rng: R) -> Self {
        Self { k, rng }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }
}

impl<R: Rng> DecodingStrategy for TopK<R> {
    fn next_token(&mut self, logits: &[f32]) -> Option<utok> {
        if logits.is_empty() {
            return None;
        }
        // 稳定排序，相等的 logits 保持原始序号顺序
        let mut candidates = logits.iter().copied().enumerate().collect::<Vec<_>>();
        candidates.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        candidates.truncate(self.k.clamp(1, logits.len()));

        let probs = softmax(candidates.iter().map(|&(_, logit)| logit));
        let i = sample(&probs, self.rng.gen());
        Some(candidates[i].0 as _)
    }
}

/// p_i = exp(l_i - max) / sum(exp(l_j - max))
fn softmax(logits: impl Iterator<Item = f32> + Clone) -> Vec<f32> {
    let max = logits.clone().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.map(|l| (l - max).exp()).collect::<Vec<_>>();
    let sum = exps.iter().sum::<f32>();
    exps.into_iter().map(|e| e / sum).collect()
}

/// 逆累积分布采样，`u` 取自 [0, 1)。
fn sample(probs: &[f32], u: f32) -> usize {
    let mut cumulative = 0.;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return i;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_takes_first_max() {
        let mut greedy = Greedy;
        assert_eq!(greedy.next_token(&[0.1, 0.9, 0.9]), Some(1));
        assert_eq!(greedy.next_token(&[0.1, 0.9, 0.9]), Some(1));
        assert_eq!(greedy.next_token(&[-3., -1., -2.]), Some(1));
        assert_eq!(greedy.next_token(&[f32::NEG_INFINITY; 3]), Some(0));
        assert_eq!(greedy.next_token(&[]), None);
    }

    #[test]
    fn top_k_stays_within_top_k() {
        let logits = [0.5, 3., -1., 2.5, 0., 2.9, 1.];
        let mut top_k = TopK::seeded(3, 42);
        for _ in 0..500 {
            let t = top_k.next_token(&logits).unwrap();
            assert!([1, 3, 5].contains(&t), "{t} is not in top 3");
        }
    }

    #[test]
    fn top_1_is_greedy() {
        let logits = [0.1, 0.9, 0.9, -2., 0.3];
        let mut top_1 = TopK::seeded(1, 7);
        for _ in 0..100 {
            assert_eq!(top_1.next_token(&logits), Greedy.next_token(&logits));
        }
    }

    #[test]
    fn k_larger_than_vocab_uses_whole_vocab() {
        let logits = [1., 1., 1.];
        let mut top_k = TopK::seeded(100, 1);
        let mut seen = [false; 3];
        for _ in 0..300 {
            seen[top_k.next_token(&logits).unwrap() as usize] = true;
        }
        assert_eq!(seen, [true; 3]);
        assert_eq!(top_k.next_token(&[]), None);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let logits = (0..50).map(|i| (i % 7) as f32).collect::<Vec<_>>();
        let mut a = TopK::seeded(DEFAULT_TOP_K, 2024);
        let mut b = TopK::seeded(DEFAULT_TOP_K, 2024);
        for _ in 0..100 {
            assert_eq!(a.next_token(&logits), b.next_token(&logits));
        }
    }

    #[test]
    fn softmax_normalizes() {
        let probs = softmax([1000., 1000., 999.].into_iter());
        assert!((probs.iter().sum::<f32>() - 1.).abs() < 1e-5);
        assert!((probs[0] - probs[1]).abs() < 1e-6);
        assert!(probs[2] < probs[0]);
    }

    #[test]
    fn inverse_cdf() {
        let probs = [0.25, 0.5, 0.25];
        assert_eq!(sample(&probs, 0.), 0);
        assert_eq!(sample(&probs, 0.25), 1);
        assert_eq!(sample(&probs, 0.74), 1);
        assert_eq!(sample(&probs, 0.75), 2);
        // 累积误差不足 1 时落到最后一项
        assert_eq!(sample(&[0.3, 0.3], 0.99), 1);
    }

    #[test]
    fn parses_algorithm_names() {
        let parse = |s| serde_json::from_str::<DecodingAlgorithm>(s).unwrap();
        assert_eq!(parse(r#""greedy""#), DecodingAlgorithm::Greedy);
        assert_eq!(parse(r#""Greedy""#), DecodingAlgorithm::Greedy);
        assert_eq!(parse(r#""topK""#), DecodingAlgorithm::TopK);
        assert_eq!(parse(r#""TopK""#), DecodingAlgorithm::TopK);
        assert!(serde_json::from_str::<DecodingAlgorithm>(r#""beam""#).is_err());
    }
}
