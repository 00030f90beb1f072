//! Interface de linha de comando do analisador de conformidade baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (analyze, schema, health)
//! e flags globais (--model, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Análise de conformidade DAM em três etapas para imagens de ativos digitais.
#[derive(Debug, Parser)]
#[command(name = "dam-compliance", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Modelo Gemini a usar nesta sessão (substitui o arquivo de configuração).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Número máximo de retentativas por requisição ao modelo.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o fluxo de análise sobre uma imagem.
    Analyze(AnalyzeArgs),

    /// Imprime um dos esquemas JSON usados nos prompts.
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },

    /// Verifica se o modelo configurado está respondendo.
    Health,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Caminho da imagem (JPEG ou PNG).
    pub image: PathBuf,

    /// Arquivo JSON com os metadados do ativo.
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Etapa inicial (1, 2 ou 3).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub from_step: u8,

    /// Reexecuta a partir da etapa que falhou até N vezes.
    #[arg(long, default_value_t = 0)]
    pub retry_failed: u32,

    /// Estado salvo de uma execução anterior, usado para retomar.
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Grava o estado final em JSON neste caminho.
    #[arg(long)]
    pub save_state: Option<PathBuf>,

    /// Imprime o relatório de resultados em JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Esquema a imprimir com `schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    /// Esquema do job aid preenchido na etapa 2.
    JobAid,
    /// Esquema dos achados da etapa 3.
    Findings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_analyze_subcommand() {
        let cli = Cli::parse_from(["dam-compliance", "analyze", "hero.jpg"]);
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.image, PathBuf::from("hero.jpg"));
                assert_eq!(args.from_step, 1);
                assert_eq!(args.retry_failed, 0);
                assert!(args.metadata.is_none());
                assert!(!args.json);
            }
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn cli_parses_resume_options() {
        let cli = Cli::parse_from([
            "dam-compliance",
            "analyze",
            "hero.png",
            "--metadata",
            "meta.json",
            "--from-step",
            "2",
            "--retry-failed",
            "3",
            "--state",
            "run.json",
            "--json",
        ]);
        let Command::Analyze(args) = cli.command else {
            panic!("expected Analyze command");
        };
        assert_eq!(args.metadata, Some(PathBuf::from("meta.json")));
        assert_eq!(args.from_step, 2);
        assert_eq!(args.retry_failed, 3);
        assert_eq!(args.state, Some(PathBuf::from("run.json")));
        assert!(args.json);
    }

    #[test]
    fn cli_rejects_unknown_step() {
        let result = Cli::try_parse_from(["dam-compliance", "analyze", "a.jpg", "--from-step", "4"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "dam-compliance",
            "--model",
            "gemini-1.5-pro",
            "--max-retries",
            "5",
            "--verbose",
            "health",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(cli.max_retries, Some(5));
        assert!(matches!(cli.command, Command::Health));
    }

    #[test]
    fn cli_parses_schema_subcommand() {
        let cli = Cli::parse_from(["dam-compliance", "schema", "job-aid"]);
        assert!(matches!(
            cli.command,
            Command::Schema {
                kind: SchemaKind::JobAid
            }
        ));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
