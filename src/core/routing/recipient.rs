//! 接收方规范化模块
//!
//! 传输层可能用两种命名空间报告同一个真实用户（如 `xxx@c.us` 与
//! `xxx@s.whatsapp.net`），也可能给出不带后缀的纯号码。本模块把这些形式
//! 统一为可比较的形式。所有函数都是纯函数，不会失败。

/// 默认的两种命名空间后缀
pub const DEFAULT_NAMESPACE_SUFFIXES: [&str; 2] = ["c.us", "s.whatsapp.net"];

/// 去掉路由后缀（`@` 及其之后的内容）
///
/// 这是转发给 Webhook 时使用的形式
pub fn strip_suffix(id: &str) -> &str {
    let trimmed = id.trim();
    match trimmed.split_once('@') {
        Some((user, _)) => user,
        None => trimmed,
    }
}

/// 规范化会话 ID
///
/// 去掉路由后缀和号码前的 `+`，空输入得到空输出
pub fn normalize(id: &str) -> String {
    strip_suffix(id).trim_start_matches('+').to_string()
}

/// 判断 ID 是否带有指定后缀
pub fn has_suffix(id: &str, suffix: &str) -> bool {
    match id.trim().split_once('@') {
        Some((_, domain)) => domain.eq_ignore_ascii_case(suffix),
        None => false,
    }
}

/// 接收方等价判断器
///
/// 持有两种已知命名空间后缀
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientMatcher {
    suffixes: [String; 2],
}

impl Default for RecipientMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE_SUFFIXES[0], DEFAULT_NAMESPACE_SUFFIXES[1])
    }
}

impl RecipientMatcher {
    /// 创建判断器
    ///
    /// # 参数说明
    /// * `primary` - 序列化形式使用的后缀（不含 `@`）
    /// * `alternate` - 另一种命名空间后缀（不含 `@`）
    pub fn new(primary: &str, alternate: &str) -> Self {
        Self {
            suffixes: [
                primary.trim_start_matches('@').to_string(),
                alternate.trim_start_matches('@').to_string(),
            ],
        }
    }

    /// 从配置的后缀列表创建，不足两个时用默认后缀补齐
    pub fn from_suffixes(suffixes: &[String]) -> Self {
        let primary = suffixes.first().map_or(DEFAULT_NAMESPACE_SUFFIXES[0], String::as_str);
        let alternate = suffixes.get(1).map_or(DEFAULT_NAMESPACE_SUFFIXES[1], String::as_str);
        Self::new(primary, alternate)
    }

    /// 判断两个 ID 是否指向同一接收方
    ///
    /// 规范化形式相同，或者把其中一个的命名空间后缀替换为另一种后与对方相同，即视为相同
    pub fn same_recipient(&self, a: &str, b: &str) -> bool {
        if normalize(a) == normalize(b) {
            return true;
        }
        let (a, b) = (a.trim(), b.trim());
        self.swap_namespace(a).as_deref() == Some(b) || self.swap_namespace(b).as_deref() == Some(a)
    }

    /// 把 ID 的命名空间后缀替换为另一种，不带已知后缀时返回 None
    fn swap_namespace(&self, id: &str) -> Option<String> {
        let (user, domain) = id.split_once('@')?;
        let [primary, alternate] = &self.suffixes;
        if domain == primary {
            Some(format!("{}@{}", user, alternate))
        } else if domain == alternate {
            Some(format!("{}@{}", user, primary))
        } else {
            None
        }
    }
}

/// 使用默认后缀判断两个 ID 是否指向同一接收方
pub fn same_recipient(a: &str, b: &str) -> bool {
    RecipientMatcher::default().same_recipient(a, b)
}
