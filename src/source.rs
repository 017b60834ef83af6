//! 从 `tokenizer.json` 与 `tokenizer_config.json` 中提取构造词表所需的原始数据。
//!
//! 两个文档中只有五个字段是必需的：
//!
//! - `tokenizer.json` 的 `model.vocab` 与 `model.merges`；
//! - `tokenizer_config.json` 的 `unk_token`、`bos_token` 与 `eos_token`。
//!
//! 其余字段全部忽略。

use crate::{utok, Error, Result};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

/// 构造 [`Vocabulary`](crate::Vocabulary) 所需的原始数据。
#[derive(Clone, Default, Debug)]
pub struct VocabSource {
    /// token 字符串 -> token 序号
    pub vocab: HashMap<String, utok>,
    /// 合词规则，每项形如 `"left right"`，排名即其在列表中的位置
    pub merges: Vec<String>,
    pub unk_token: String,
    pub bos_token: String,
    pub eos_token: String,
}

#[derive(Deserialize)]
struct TokenizerDoc {
    model: Option<ModelDoc>,
}

#[derive(Deserialize)]
struct ModelDoc {
    vocab: Option<HashMap<String, utok>>,
    merges: Option<Vec<MergeDoc>>,
}

/// 旧格式为 `"a b"`，新格式为 `["a", "b"]`。
#[derive(Deserialize)]
#[serde(untagged)]
enum MergeDoc {
    Joined(String),
    Parts(Vec<String>),
}

impl From<MergeDoc> for String {
    fn from(merge: MergeDoc) -> Self {
        match merge {
            MergeDoc::Joined(s) => s,
            MergeDoc::Parts(parts) => parts.join(" "),
        }
    }
}

#[derive(Deserialize)]
struct ConfigDoc {
    unk_token: Option<SpecialDoc>,
    bos_token: Option<SpecialDoc>,
    eos_token: Option<SpecialDoc>,
}

/// 特殊词可以是字符串，也可以是带 `content` 的 added token 对象。
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecialDoc {
    Text(String),
    Added { content: String },
}

impl From<SpecialDoc> for String {
    fn from(special: SpecialDoc) -> Self {
        match special {
            SpecialDoc::Text(s) | SpecialDoc::Added { content: s } => s,
        }
    }
}

impl VocabSource {
    /// 解析两个 json 文档。
    pub fn from_json(tokenizer: &str, config: &str) -> Result<Self> {
        let TokenizerDoc { model } = serde_json::from_str(tokenizer)?;
        let ConfigDoc {
            unk_token,
            bos_token,
            eos_token,
        } = serde_json::from_str(config)?;

        let (vocab, merges) = match model {
            Some(ModelDoc { vocab, merges }) => (vocab, merges),
            None => (None, None),
        };
        Ok(Self {
            vocab: vocab.ok_or(Error::MissingRequiredVocabularyField("model.vocab"))?,
            merges: merges
                .ok_or(Error::MissingRequiredVocabularyField("model.merges"))?
                .into_iter()
                .map(String::from)
                .collect(),
            unk_token: unk_token
                .ok_or(Error::MissingRequiredVocabularyField("unk_token"))?
                .into(),
            bos_token: bos_token
                .ok_or(Error::MissingRequiredVocabularyField("bos_token"))?
                .into(),
            eos_token: eos_token
                .ok_or(Error::MissingRequiredVocabularyField("eos_token"))?
                .into(),
        })
    }

    /// 从目录中读取 `tokenizer.json` 和 `tokenizer_config.json`。
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let tokenizer = fs::read_to_string(dir.join("tokenizer.json"))?;
        let config = fs::read_to_string(dir.join("tokenizer_config.json"))?;
        Self::from_json(&tokenizer, &config)
    }
}
