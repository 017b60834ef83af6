//! 自回归生成循环。
//!
//! 状态机：格式化 -> 逐 token 生成（至多 `max_tokens` 步）-> 清理文本。
//! 每一步的输入依赖上一步采样的 token，因此单次生成内部严格串行；
//! 多次生成可以共享同一个 [`TextGenerator`] 并发执行，每次生成有自己的序列和解码策略。

use crate::{
    clean_generated_text, format_messages, utok, BpeEncoder, DecodingAlgorithm, DecodingStrategy,
    Error, Greedy, Message, ModelActor, Result, TopK, DEFAULT_TOP_K,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 生成参数。
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    #[serde(default)]
    pub algorithm: DecodingAlgorithm,
    pub max_tokens: usize,
    /// 只在 `algorithm` 为 Top-K 时使用，缺省为 [`DEFAULT_TOP_K`]。
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Top-K 采样的随机种子，缺省时使用系统熵。
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GenerationParameters {
    pub fn greedy(max_tokens: usize) -> Self {
        Self {
            algorithm: DecodingAlgorithm::Greedy,
            max_tokens,
            top_k: None,
            seed: None,
        }
    }

    pub fn top_k(max_tokens: usize, top_k: Option<usize>) -> Self {
        Self {
            algorithm: DecodingAlgorithm::TopK,
            max_tokens,
            top_k,
            seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 解析并检查 json 形式的参数。
    pub fn from_json(json: &str) -> Result<Self> {
        let params = serde_json::from_str::<Self>(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidParameters("maxTokens must be positive".into()));
        }
        if self.top_k == Some(0) {
            return Err(Error::InvalidParameters("topK must be positive".into()));
        }
        Ok(())
    }

    /// 为一次生成创建解码策略。
    pub fn strategy(&self) -> Box<dyn DecodingStrategy + Send> {
        match self.algorithm {
            DecodingAlgorithm::Greedy => Box::new(Greedy),
            DecodingAlgorithm::TopK => {
                let k = self.top_k.unwrap_or(DEFAULT_TOP_K);
                match self.seed {
                    Some(seed) => Box::new(TopK::seeded(k, seed)),
                    None => Box::new(TopK::new(k)),
                }
            }
        }
    }
}

/// 生成结束的原因。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
    /// 采样到 end-of-sequence token。
    EndOfSequence,
    /// 采样到 begin-of-sequence token，它也被当作结束信号。
    BeginOfSequence,
    /// 达到 `max_tokens`。
    MaxTokens,
    /// 外部取消。
    Cancelled,
}

/// 一次生成的结果。
#[derive(Clone, PartialEq, Debug)]
pub struct Generation {
    /// 清理后的生成文本
    pub text: String,
    /// 生成的 token，不含提示词
    pub tokens: Vec<utok>,
    pub stop: StopReason,
}

/// 把分词器和模型 actor 组合成对话生成器。
#[derive(Clone)]
pub struct TextGenerator {
    encoder: Arc<BpeEncoder>,
    model: ModelActor,
}

impl TextGenerator {
    pub fn new(encoder: impl Into<Arc<BpeEncoder>>, model: ModelActor) -> Self {
        Self {
            encoder: encoder.into(),
            model,
        }
    }

    #[inline]
    pub fn encoder(&self) -> &BpeEncoder {
        &self.encoder
    }

    #[inline]
    pub fn model(&self) -> &ModelActor {
        &self.model
    }

    /// 格式化消息并编码为初始 token 序列。
    pub fn prompt_tokens(&self, messages: &[Message]) -> Result<Vec<utok>> {
        let prompt = format_messages(messages)?;
        tracing::debug!("formatted prompt: {prompt:?}");
        let tokens = self.encoder.encode(&prompt);
        tracing::debug!("prompt tokens: {tokens:?}");
        Ok(tokens)
    }

    pub async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParameters,
    ) -> Result<Generation> {
        self.generate_with(messages, params, |_| {}, &CancellationToken::new())
            .await
    }

    /// 生成回复，每解码出一段文本就交给 `on_text`。
    ///
    /// `cancel` 在每一步开始前检查，不会打断正在进行的推理；
    /// 取消时返回已生成的文本而不是错误。
    ///
    /// `on_text` 在生成循环中同步调用，耗时会直接拖慢生成；
    /// 需要在别处处理文本时，在闭包里把文本发送到通道即可。
    pub async fn generate_with(
        &self,
        messages: &[Message],
        params: &GenerationParameters,
        mut on_text: impl FnMut(&str) + Send,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        params.validate()?;
        let mut tokens = self.prompt_tokens(messages)?;
        let (eos, bos) = self.stop_tokens()?;
        let mut strategy = params.strategy();

        let mut generated = Vec::new();
        let mut text = String::new();
        let mut stop = StopReason::MaxTokens;
        for step in 0..params.max_tokens {
            if cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }
            let logits = self.model.infer(tokens.clone()).await?;
            let next = strategy.next_token(&logits).ok_or(Error::EmptyLogits)?;
            tokens.push(next);
            generated.push(next);

            if let Some(piece) = self.encoder.decode_token(next) {
                tracing::trace!("step {step}: {next} {piece:?}");
                text.push_str(piece);
                on_text(piece);
            }

            if next == eos {
                stop = StopReason::EndOfSequence;
                break;
            }
            // TODO: bos 作为结束信号是针对 Mistral 词表的行为，换词表时需要重新确认
            if next == bos {
                stop = StopReason::BeginOfSequence;
                break;
            }
        }

        tracing::info!("generation stopped by {stop:?} after {} tokens", generated.len());
        Ok(Generation {
            text: clean_generated_text(&text),
            tokens: generated,
            stop,
        })
    }

    /// 编码 eos 和 bos，各取第一个 token。
    fn stop_tokens(&self) -> Result<(utok, utok)> {
        let vocab = self.encoder.vocab();
        let eos = self.encoder.encode(vocab.eos_token());
        let bos = self.encoder.encode(vocab.bos_token());
        Ok((
            *eos.first().ok_or(Error::InvalidEosToken)?,
            *bos.first().ok_or(Error::InvalidBosToken)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters() {
        let params = GenerationParameters::from_json(r#"{"algorithm":"topK","maxTokens":64}"#).unwrap();
        assert_eq!(params, GenerationParameters::top_k(64, None));

        let params =
            GenerationParameters::from_json(r#"{"algorithm":"TopK","maxTokens":8,"topK":3,"seed":1}"#)
                .unwrap();
        assert_eq!(params, GenerationParameters::top_k(8, Some(3)).with_seed(1));

        let params = GenerationParameters::from_json(r#"{"maxTokens":1}"#).unwrap();
        assert_eq!(params, GenerationParameters::greedy(1));
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            GenerationParameters::from_json(r#"{"maxTokens":0}"#),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            GenerationParameters::from_json(r#"{"algorithm":"topK","maxTokens":4,"topK":0}"#),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            GenerationParameters::from_json(r#"{"algorithm":"beam","maxTokens":4}"#),
            Err(Error::InvalidJson(_))
        ));
        assert!(matches!(
            GenerationParameters::from_json(r#"{"algorithm":"greedy"}"#),
            Err(Error::InvalidJson(_))
        ));
    }

    #[test]
    fn builds_strategy() {
        let logits = [0.1, 0.9, 0.9, 0.3];
        let mut greedy = GenerationParameters::greedy(1).strategy();
        assert_eq!(greedy.next_token(&logits), Some(1));
        let mut top_1 = GenerationParameters::top_k(1, Some(1)).strategy();
        assert_eq!(top_1.next_token(&logits), Some(1));
        let mut top_2 = GenerationParameters::top_k(1, Some(2)).with_seed(3).strategy();
        assert!(matches!(top_2.next_token(&logits), Some(1 | 2)));
    }
}
