use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DealerSDKError {
    /// 网络层错误（连接失败、超时等）
    Transport(String),
    /// 服务端返回非 2xx
    Http {
        status: u16,
        message: String,
    },
    Serialization(String),
    /// 请求成功但响应结构不可信（缺 id、缺 createdAt、空 body）
    MalformedResponse(String),
    NotFound(String),
    InvalidArgument(String),
    InvalidOperation(String),
    Config(String),
    Other(String),
}

impl fmt::Display for DealerSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealerSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            DealerSDKError::Http { status, message } => {
                write!(f, "HTTP error [{}]: {}", status, message)
            }
            DealerSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            DealerSDKError::MalformedResponse(e) => write!(f, "Malformed response: {}", e),
            DealerSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            DealerSDKError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            DealerSDKError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            DealerSDKError::Config(e) => write!(f, "Config error: {}", e),
            DealerSDKError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for DealerSDKError {}

impl From<serde_json::Error> for DealerSDKError {
    fn from(error: serde_json::Error) -> Self {
        DealerSDKError::Serialization(error.to_string())
    }
}

impl DealerSDKError {
    /// 通知里展示给用户的描述（不带错误分类前缀）
    pub fn user_message(&self) -> String {
        match self {
            DealerSDKError::Transport(e)
            | DealerSDKError::Serialization(e)
            | DealerSDKError::MalformedResponse(e)
            | DealerSDKError::NotFound(e)
            | DealerSDKError::InvalidArgument(e)
            | DealerSDKError::InvalidOperation(e)
            | DealerSDKError::Config(e)
            | DealerSDKError::Other(e) => e.clone(),
            DealerSDKError::Http { message, .. } => message.clone(),
        }
    }

    /// 便于服务实现方从 HTTP 状态码构造错误
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 404 {
            return DealerSDKError::NotFound(message);
        }
        DealerSDKError::Http { status, message }
    }

    /// HTTP 状态码（如果这是一个 HTTP 错误）
    pub fn status(&self) -> Option<u16> {
        match self {
            DealerSDKError::Http { status, .. } => Some(*status),
            DealerSDKError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// 仅用于展示/日志分类，引擎本身从不重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DealerSDKError::Transport(_) => true,
            DealerSDKError::Http { status, .. } => *status >= 500 && *status < 600,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DealerSDKError>;
