//! 账号令牌的读取与展示
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// 无法解析邮箱时使用的占位标签
pub const PLACEHOLDER_LABEL: &str = "unknown@sparkchain.ai";

/// 载荷有无 `=` 填充都接受
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 一个账号：Bearer令牌和用于展示的标签
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    label: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let label = decode_label(&token).label().to_string();
        Self { token, label }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// 令牌中的邮箱，解析失败时为占位标签
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 打码后的标签，用于日志
    pub fn masked_label(&self) -> String {
        mask_account(&self.label)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// 标签解析失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// 不是 header.payload.signature 三段结构
    Malformed,
    /// 载荷不是合法的base64url
    InvalidBase64,
    /// 载荷不是UTF-8 JSON对象
    InvalidJson,
    /// JSON里没有email字段
    MissingEmail,
}

/// 标签解析结果：要么拿到邮箱，要么带着原因回退到占位标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelDecode {
    Decoded(String),
    Fallback(FallbackReason),
}

impl LabelDecode {
    pub fn label(&self) -> &str {
        match self {
            LabelDecode::Decoded(email) => email,
            LabelDecode::Fallback(_) => PLACEHOLDER_LABEL,
        }
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    email: Option<String>,
}

/// 从JWT载荷中取出email，永不失败
pub fn decode_label(token: &str) -> LabelDecode {
    let parts: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return LabelDecode::Fallback(FallbackReason::Malformed);
    };

    let bytes = match PAYLOAD_ENGINE.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(_) => return LabelDecode::Fallback(FallbackReason::InvalidBase64),
    };

    match serde_json::from_slice::<TokenClaims>(&bytes) {
        Ok(TokenClaims { email: Some(email) }) => LabelDecode::Decoded(email),
        Ok(TokenClaims { email: None }) => LabelDecode::Fallback(FallbackReason::MissingEmail),
        Err(_) => LabelDecode::Fallback(FallbackReason::InvalidJson),
    }
}

/// 邮箱打码：本地部分保留前3位和后3位，中间换成 `***`，域名不变
pub fn mask_account(account: &str) -> String {
    match account.split_once('@') {
        Some((local, domain)) => {
            let chars: Vec<char> = local.chars().collect();
            let head: String = chars.iter().take(3).collect();
            let tail: String = chars[chars.len().saturating_sub(3)..].iter().collect();
            format!("{}***{}@{}", head, tail, domain)
        }
        None => account.to_string(),
    }
}

/// 读取令牌文件，每个非空行是一个令牌
pub fn load_credentials(path: &Path) -> Result<Vec<Credential>> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::CredentialsNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Credential::new)
        .collect())
}
