//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use scopegate_core::models::profile::ProfileKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON catalog document. The built-in member/staff catalog is used
    /// when omitted.
    #[arg(short, long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Output format of the report
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Effective field access of one profile
    Profile {
        /// Username of the profile
        username: String,
        /// Restrict the report to one entity type
        #[arg(short, long)]
        entity: Option<String>,
        /// Create a transient profile of this kind holding its default role
        /// when the catalog has no such username
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Profile type of the transient profile
        #[arg(long = "type", requires = "kind")]
        profile_type: Option<String>,
    },
    /// Every role with the permissions it grants
    Rbac,
    /// Which scope contributes or removes a field
    Explain {
        /// Scope code
        scope: String,
        /// Public field name
        field: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum KindArg {
    Member,
    Staff,
}

impl From<KindArg> for ProfileKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Member => ProfileKind::Member,
            KindArg::Staff => ProfileKind::Staff,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transient_profile_arguments() {
        let cli = Cli::parse_from([
            "scopegate-inspect",
            "profile",
            "alice",
            "--kind",
            "member",
            "--type",
            "real",
            "--format",
            "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Profile {
                username,
                kind,
                profile_type,
                entity,
            } => {
                assert_eq!(username, "alice");
                assert!(matches!(kind, Some(KindArg::Member)));
                assert_eq!(profile_type.as_deref(), Some("real"));
                assert!(entity.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn type_requires_kind() {
        let parsed = Cli::try_parse_from(["scopegate-inspect", "profile", "alice", "--type", "real"]);
        assert!(parsed.is_err());
    }
}
