//! 日志管理模块
//!
//! 基于 `tracing` 的结构化日志。日志行使用方括号标签标识生命周期阶段：
//! `[PROXY]` 后端调用、`[TRANSLIT]` 协议转换、`[MOCK]` 降级响应、`[SESSION]` 会话存储。
//! 日志只影响可观测性，不改变任何行为。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// 安装全局日志订阅器
///
/// `RUST_LOG` 优先；否则 debug 模式下为 `chargpt_gateway=debug`，其余为 `info`。
/// 重复调用是安全的（后续调用不生效）。
pub fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("info,chargpt_gateway=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 脱敏规则
static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        // API key 各种格式
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        // 通用 token
        (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
        (
            r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._\s-]+"#,
            "authorization: ***",
        ),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        // postgres / redis 连接串中的密码
        (r"://([^:/@\s]+):[^@/\s]+@", "://$1:***@"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 对日志消息做脱敏处理
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

/// 截取存储键的前 6 个字符用于日志
pub fn short_key(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    format!("{}…", prefix)
}
