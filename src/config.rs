//! Configuração do gradesync carregada a partir de `gradesync.toml`.
//!
//! A struct [`SyncConfig`] contém todos os parâmetros ajustáveis da ponte.
//! Chaves ausentes no arquivo usam defaults. As variáveis de ambiente
//! `GRADESYNC_API_TOKEN` e `GRADESYNC_BASE_URL` têm precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;

pub const DEFAULT_CONFIG_FILE: &str = "gradesync.toml";

/// Configuração de nível superior carregada de `gradesync.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// URL base do serviço de registros; os caminhos de recurso são anexados a ela.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token bearer enviado em cada entrega. Vazio desativa o cabeçalho.
    #[serde(default)]
    pub api_token: String,

    /// Limite superior de uma entrega, conexão incluída.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Arquivo SQLite do armazenamento de registros.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Id do papel que marca um usuário como avaliador.
    #[serde(default = "default_grader_role_id")]
    pub grader_role_id: i64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("gradesync.db")
}

fn default_grader_role_id() -> i64 {
    11
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            database_path: default_database_path(),
            grader_role_id: default_grader_role_id(),
        }
    }
}

impl SyncConfig {
    /// Carrega `gradesync.toml` do diretório atual.
    pub fn load() -> Result<Self, SyncError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Carrega o arquivo indicado, ou os defaults se ele não existir.
    pub fn load_from(path: &Path) -> Result<Self, SyncError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<SyncConfig>(&contents)?
        } else {
            Self::default()
        };

        if let Some(token) = non_empty_env("GRADESYNC_API_TOKEN") {
            config.api_token = token;
        }
        if let Some(url) = non_empty_env("GRADESYNC_BASE_URL") {
            config.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.timeout_secs == 0 {
            return Err(SyncError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(SyncError::Config("base_url must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
