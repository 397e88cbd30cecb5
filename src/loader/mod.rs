//! # Módulo de Carregamento - Leitura de Suítes
//!
//! Lê e faz o parse de arquivos de suíte do disco.
//!
//! ## O que este módulo faz?
//!
//! 1. Lê o arquivo JSON da suíte
//! 2. Converte o JSON em estruturas Rust (deserialização)
//! 3. Carrega os payloads indicados por `payload_file`, relativos à pasta
//!    da suíte, para dentro de `payload`
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! let suite = load_suite_from_file("./suites/hello.json")?;
//! println!("Suíte carregada: {}", suite.meta.name);
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::protocol::Suite;

/// Carrega uma suíte de um arquivo JSON.
///
/// ## Retorno:
/// - `Ok(Suite)`: suíte carregada, com todos os payloads em memória
/// - `Err`: arquivo ausente, JSON inválido, ou `payload_file` ilegível
///
/// ## Exemplos de erro:
/// - "Failed to read suite file" → Arquivo não existe ou sem permissão
/// - "Failed to parse suite JSON" → JSON malformado ou estrutura inválida
/// - "Case 'x' declares both payload and payload_file"
pub fn load_suite_from_file<P: AsRef<Path>>(path: P) -> Result<Suite> {
    let path_ref = path.as_ref();

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read suite file {:?}", path_ref))?;

    let mut suite: Suite = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse suite JSON {:?}", path_ref))?;

    let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
    resolve_payload_files(&mut suite, base_dir)?;

    tracing::debug!(suite = %suite.meta.id, cases = suite.cases.len(), "Suite loaded");
    Ok(suite)
}

/// Lê cada `payload_file` para dentro de `payload`.
pub fn resolve_payload_files(suite: &mut Suite, base_dir: &Path) -> Result<()> {
    for case in &mut suite.cases {
        let Some(file) = case.message.payload_file.take() else {
            continue;
        };
        if case.message.payload.is_some() {
            bail!("Case '{}' declares both payload and payload_file", case.id);
        }

        let full_path = base_dir.join(&file);
        let payload = fs::read_to_string(&full_path).with_context(|| {
            format!("Failed to read payload file {:?} for case '{}'", full_path, case.id)
        })?;
        case.message.payload = Some(payload);
    }
    Ok(())
}
