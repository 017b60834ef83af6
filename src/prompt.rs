//! 把对话消息格式化为指令模型的提示词。

use crate::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(Error::UnsupportedMessageRole(s.into())),
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// 格式化消息列表。
///
/// 只有第一条消息可以是 system；
/// 每条 user 消息打开一轮 `[INST]`，assistant 消息以 `</s>` 结束这一轮，
/// 最后一条是未被回答的 user 消息时补一个 `</s>`。
pub fn format_messages(messages: &[Message]) -> Result<String> {
    let mut ans = String::new();
    let rest = match messages {
        [Message {
            role: Role::System,
            content,
        }, rest @ ..] => {
            ans.push_str(&format!("<s>[INST] {content} [/INST] "));
            rest
        }
        _ => messages,
    };

    for Message { role, content } in rest {
        match role {
            Role::User => ans.push_str(&format!(
                "<s>[INST] user: {content} [/INST] [INST] assistant: "
            )),
            Role::Assistant => ans.push_str(&format!("{content} </s> ")),
            Role::System => return Err(Error::UnsupportedMessageRole(role.to_string())),
        }
    }

    if let [.., Message {
        role: Role::User, ..
    }] = rest
    {
        ans.push_str("</s> ");
    }
    Ok(ans)
}
