use crate::{as_byte_token, WORD_BOUNDARY};
use patricia_tree::PatriciaMap;
use std::sync::LazyLock;

/// 生成文本中需要删除的控制标签。
const CONTROL_TAGS: [&str; 12] = [
    "[INST]", "[/INST]", "<s>", "</s>", "Assistant:", "User:", "<<SYS>>", "<</SYS>>", "<b>",
    "</b>", "<i>", "</i>",
];

/// 替换表的前缀树：控制标签替换为空，词首标记替换为空格。
static REPLACEMENTS: LazyLock<PatriciaMap<&'static str>> = LazyLock::new(|| {
    let mut map = PatriciaMap::new();
    for tag in CONTROL_TAGS {
        map.insert(tag, "");
    }
    let mut buf = [0u8; 4];
    map.insert(WORD_BOUNDARY.encode_utf8(&mut buf), " ");
    map
});

/// 清理生成的文本。
///
/// 单遍扫描：`<0xNN>` 形式的字节词还原为字节，连续的字节词拼起来按 utf-8 解码；
/// 控制标签删除；词首标记 `▁` 替换为空格；其他内容原样保留。
/// 字节词还原出的文本不会再参与标签和标记的替换。
pub fn clean_generated_text(text: &str) -> String {
    let mut ans = String::with_capacity(text.len());
    let mut bytes = Vec::new();
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if let Some(b) = rest.as_bytes().get(..6).and_then(as_byte_token) {
            bytes.push(b);
            rest = &rest[6..];
            continue;
        }
        flush_bytes(&mut bytes, &mut ans);
        match REPLACEMENTS.get_longest_common_prefix(rest.as_bytes()) {
            Some((prefix, replacement)) => {
                ans.push_str(replacement);
                rest = &rest[prefix.len()..];
            }
            None => {
                ans.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush_bytes(&mut bytes, &mut ans);
    ans
}

fn flush_bytes(bytes: &mut Vec<u8>, ans: &mut String) {
    if !bytes.is_empty() {
        ans.push_str(&String::from_utf8_lossy(bytes));
        bytes.clear();
    }
}
