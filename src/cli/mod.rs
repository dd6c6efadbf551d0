//! CLI module for signing key management
//!
//! Every subcommand loads configuration, opens the configured record store
//! and prints its result as JSON on stdout.

mod commands;

use clap::{Args, Parser, Subcommand};

pub use commands::run;

/// Signing keys - issue, validate and rotate scoped bearer keys
#[derive(Debug, Parser)]
#[command(name = "signing-keys")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations (postgres backend)
    Migrate,

    /// Issue a new key
    Issue(IssueArgs),

    /// Check a key against a scope
    Verify(VerifyArgs),

    /// Deactivate a key
    Expire(SignatureArg),

    /// Replace a key with a new successor
    Rotate(RotateArgs),

    /// Rotate every key expiring soon
    RotateExpiring(RotateExpiringArgs),

    /// Show a single key
    Show(SignatureArg),

    /// List keys, optionally filtered
    List(ListArgs),

    /// Show a key's rotation chain
    Lineage(LineageArgs),
}

#[derive(Debug, Args)]
pub struct SignatureArg {
    pub signature: String,
}

#[derive(Debug, Args)]
pub struct IssueArgs {
    /// Permission tags (comma separated or repeated); none means any scope
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Lifetime in hours (0 = never expires)
    #[arg(long, default_value_t = 0)]
    pub expiration_hours: u32,

    #[arg(long)]
    pub email: Option<String>,

    /// Create the key disabled
    #[arg(long)]
    pub inactive: bool,

    #[arg(long)]
    pub previous_key: Option<String>,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    pub signature: String,

    /// Requested permission tags
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RotateArgs {
    pub signature: String,

    /// Successor lifetime in hours (inherited when omitted)
    #[arg(long)]
    pub expiration_hours: Option<u32>,

    /// Successor scope (inherited when omitted)
    #[arg(long, value_delimiter = ',')]
    pub scope: Option<Vec<String>>,
}

#[derive(Debug, Args)]
pub struct RotateExpiringArgs {
    /// Rotate keys expiring within this many hours
    #[arg(long, default_value_t = 1)]
    pub within_hours: u32,

    /// Only keys carrying every listed tag
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Select inactive keys instead of active ones
    #[arg(long)]
    pub inactive: bool,

    /// Scope given to every successor
    #[arg(long, value_delimiter = ',')]
    pub overwrite_scope: Option<Vec<String>>,

    /// Keep rotating after a failure and report it
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub active: Option<bool>,

    /// Keys carrying every listed tag
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub previous_key: Option<String>,
}

#[derive(Debug, Args)]
pub struct LineageArgs {
    pub signature: String,

    /// List direct successors instead of ancestors
    #[arg(long)]
    pub successors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_issue() {
        let cli = Cli::try_parse_from([
            "signing-keys",
            "issue",
            "--scope",
            "read,write",
            "--expiration-hours",
            "24",
            "--email",
            "owner@example.com",
        ])
        .unwrap();

        let Command::Issue(args) = cli.command else {
            panic!("expected issue command");
        };
        assert_eq!(args.scope, vec!["read", "write"]);
        assert_eq!(args.expiration_hours, 24);
        assert!(!args.inactive);
    }

    #[test]
    fn test_parse_rotate_expiring_defaults() {
        let cli = Cli::try_parse_from(["signing-keys", "rotate-expiring"]).unwrap();

        let Command::RotateExpiring(args) = cli.command else {
            panic!("expected rotate-expiring command");
        };
        assert_eq!(args.within_hours, 1);
        assert!(args.scope.is_empty());
        assert!(!args.inactive);
        assert!(args.overwrite_scope.is_none());
    }
}
