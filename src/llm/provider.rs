//! Provider-specific URL and authentication handling.
//!
//! Chat Completions is served under slightly different paths and auth
//! schemes depending on the host. Everything else in the request is shared.

/// Supported chat-completion providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// Deployment name (required for Azure)
        deployment_name: String,
        /// API version (e.g., "2024-08-01-preview")
        api_version: String,
    },
    /// Any other OpenAI-compatible endpoint (`OpenRouter`, Groq, a local server, ...).
    Generic,
}

/// Default API version used when an Azure endpoint is detected without one.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// How the API key is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure)
    ApiKeyHeader,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// Azure endpoints get an empty deployment name; the config loader fills
    /// it from `AZURE_DEPLOYMENT_NAME`.
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openai.azure.com") || lower.contains("azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("api.openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Auth scheme expected by this provider.
    #[must_use]
    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Self::AzureOpenAI { .. } => AuthScheme::ApiKeyHeader,
            Self::OpenAI | Self::Generic => AuthScheme::Bearer,
        }
    }

    /// Whether the request body must carry the `model` field.
    ///
    /// Azure routes by deployment and rejects unknown models in the body.
    #[must_use]
    pub fn sends_model_in_body(&self) -> bool {
        !matches!(self, Self::AzureOpenAI { .. })
    }

    /// Build the chat completions URL for this provider.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => {
                format!(
                    "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
                )
            }
            Self::OpenAI | Self::Generic => format!("{base}/v1/chat/completions"),
        }
    }
}
