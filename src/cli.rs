//! Interface de linha de comando do gradesync baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (init, ingest, queue, outbox)
//! e flags globais (--config, --db, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gradesync: sincroniza eventos de avaliação de quizzes com o serviço externo de registros.
#[derive(Debug, Parser)]
#[command(name = "gradesync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração. Padrão: `gradesync.toml` no diretório atual.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Banco SQLite, substituindo `database_path` da configuração.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Habilita logs em nível debug no stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria o schema do banco se ele não existir.
    Init,

    /// Processa um evento de ponta a ponta e imprime o relatório.
    Ingest {
        /// Caminho do JSON do evento, ou `-` para stdin.
        event: String,

        /// Id do usuário atuante, substituindo o `userid` do evento.
        #[arg(long)]
        actor: Option<i64>,
    },

    /// Lista as entradas da fila de avaliadores.
    Queue,

    /// Lista os registros pendentes do outbox.
    Outbox,
}
