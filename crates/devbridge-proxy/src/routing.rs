//! Two-way path split

/// Where a request is forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Push-token API
    TokenApi,
    /// Main development server
    MainServer,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::TokenApi => "token-api",
            Backend::MainServer => "main-server",
        }
    }
}

/// Maps request paths to backends and backend ports
#[derive(Debug, Clone)]
pub struct Router {
    reserved_prefix: String,
    token_api_port: u16,
    main_port: u16,
}

impl Router {
    pub fn new(reserved_prefix: impl Into<String>, token_api_port: u16, main_port: u16) -> Self {
        Self {
            reserved_prefix: reserved_prefix.into(),
            token_api_port,
            main_port,
        }
    }

    pub fn route(&self, path: &str) -> Backend {
        if path.starts_with(&self.reserved_prefix) {
            Backend::TokenApi
        } else {
            Backend::MainServer
        }
    }

    pub fn port(&self, backend: Backend) -> u16 {
        match backend {
            Backend::TokenApi => self.token_api_port,
            Backend::MainServer => self.main_port,
        }
    }
}
