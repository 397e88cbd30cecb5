//! # Módulo de Telemetria
//!
//! Configura o `tracing-subscriber` que recebe os eventos de log do Runner.
//!
//! ## Para todos entenderem:
//!
//! O motor emite eventos (`debug!`, `warn!`, `info!`) em cada entrada
//! avaliada, variável extraída e caso executado. Este módulo decide quais
//! eventos aparecem e em que formato.
//!
//! Os logs vão para o stderr, então o relatório JSON no stdout continua
//! limpo para ser redirecionado.
//!
//! ## Configuração via variáveis de ambiente:
//!
//! - `RUST_LOG`: filtro completo do `EnvFilter` (tem prioridade)
//! - `RUNNER_LOG_LEVEL`: nível mínimo (`error`, `warn`, `info`, `debug`, `trace`)
//! - `RUNNER_LOG_ANSI`: `false` desliga as cores
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! telemetry::init_telemetry(TelemetryConfig::from_env())?;
//! tracing::info!("Runner pronto");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CONFIGURAÇÃO
// ============================================================================

/// Configuração do logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Nome do serviço, registrado no evento de inicialização.
    pub service_name: String,

    /// Se deve habilitar logging para console.
    pub enable_console_logging: bool,

    /// Cores ANSI na saída.
    pub ansi: bool,

    /// Nível de log mínimo quando `RUST_LOG` não está definido.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "message-runner".to_string(),
            enable_console_logging: true,
            ansi: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Cria configuração a partir de variáveis de ambiente.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("RUNNER_LOG_LEVEL") {
            if let Ok(parsed) = level.trim().parse::<Level>() {
                config.log_level = parsed;
            }
        }

        if let Some(ansi) = lookup("RUNNER_LOG_ANSI") {
            config.ansi = !matches!(ansi.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }

        config
    }

    /// Nível mais verboso, usado pela flag `--verbose` do CLI.
    pub fn verbose(mut self) -> Self {
        self.log_level = Level::DEBUG;
        self
    }
}

// ============================================================================
// INICIALIZAÇÃO
// ============================================================================

/// Instala o subscriber global.
///
/// Falha se outro subscriber já estiver instalado.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<()> {
    // Primeiro tenta ler de RUST_LOG, senão usa o nível configurado.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.enable_console_logging {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(config.ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(service_name = %config.service_name, level = %config.log_level, "Telemetria inicializada");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "message-runner");
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.enable_console_logging);
        assert!(config.ansi);
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [("RUNNER_LOG_LEVEL", "debug"), ("RUNNER_LOG_ANSI", "false")]
            .into_iter()
            .collect();
        let config = TelemetryConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, Level::DEBUG);
        assert!(!config.ansi);
    }

    #[test]
    fn test_invalid_level_keeps_default() {
        let config = TelemetryConfig::from_lookup(|key| (key == "RUNNER_LOG_LEVEL").then(|| "loud".to_string()));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_verbose() {
        assert_eq!(TelemetryConfig::default().verbose().log_level, Level::DEBUG);
    }
}
