//! Configuração do pool carregada a partir de `jobpool.toml`.
//!
//! A struct [`PoolConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `JOBPOOL_SIZE` tem precedência sobre o `size` do arquivo.

use serde::Deserialize;
use std::path::Path;

use crate::error::PoolError;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "jobpool.toml";
/// Variável de ambiente que sobrescreve o tamanho do pool.
pub const SIZE_ENV: &str = "JOBPOOL_SIZE";

/// Configuração de nível superior carregada de `jobpool.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Número de slots de worker. Ausente significa um por thread de hardware;
    /// valores menores que 1 são tratados como 1.
    #[serde(default)]
    pub size: Option<i64>,

    /// Inicia os workers assim que o pool é construído.
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Prefixo dos nomes das threads de worker; o índice do slot é anexado.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Filtro do `tracing` usado quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// Valor padrão para o início automático: true.
fn default_autostart() -> bool {
    true
}

// Valor padrão para o prefixo das threads: "jobpool-worker".
fn default_thread_name() -> String {
    "jobpool-worker".to_string()
}

// Valor padrão para o filtro de log: "jobpool=info".
fn default_log_filter() -> String {
    "jobpool=info".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: None,
            autostart: default_autostart(),
            thread_name: default_thread_name(),
            log_filter: default_log_filter(),
        }
    }
}

impl PoolConfig {
    /// Carrega a configuração de `jobpool.toml` no diretório atual.
    pub fn load() -> Result<Self, PoolError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de `path`.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self, PoolError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::parse(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para o tamanho.
        if let Ok(raw) = std::env::var(SIZE_ENV) {
            config.apply_size_override(&raw);
        }

        Ok(config)
    }

    /// Interpreta o conteúdo TOML e valida os campos.
    pub fn parse(contents: &str) -> Result<Self, PoolError> {
        let config: PoolConfig = toml::from_str(contents)?;
        if config.thread_name.trim().is_empty() {
            return Err(PoolError::Config("thread_name must not be empty".into()));
        }
        Ok(config)
    }

    // Valores que não são inteiros são ignorados.
    fn apply_size_override(&mut self, raw: &str) {
        if let Ok(size) = raw.trim().parse::<i64>() {
            self.size = Some(size);
        }
    }
}
