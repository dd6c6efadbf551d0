//! Subcommand execution

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::signing_key::{KeyFilter, Scope, SigningKeyRepository};
use crate::domain::DomainError;
use crate::infrastructure::logging;
use crate::infrastructure::signing_key::{
    KeyView, NewSigningKey, RotateExpiring, RotateOptions, SigningKeyService,
};
use crate::infrastructure::storage::{run_signing_migrations, StorageConfig};

use super::{
    Cli, Command, IssueArgs, LineageArgs, ListArgs, RotateArgs, RotateExpiringArgs, VerifyArgs,
};

type Service = SigningKeyService<dyn SigningKeyRepository>;

/// Run the parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging)?;

    execute(cli.command, &config).await
}

/// Dispatch one command; the record store is opened only for key commands
async fn execute(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let service = || crate::create_service_with_config(config);

    match command {
        Command::Migrate => migrate(config).await,
        Command::Issue(args) => issue(&service().await?, args).await,
        Command::Verify(args) => verify(&service().await?, args).await,
        Command::Expire(args) => {
            service().await?.deactivate(&args.signature).await?;
            print_json(&json!({ "signature": args.signature, "active": false }))
        }
        Command::Rotate(args) => rotate(&service().await?, args).await,
        Command::RotateExpiring(args) => rotate_expiring(&service().await?, args).await,
        Command::Show(args) => {
            let view = service()
                .await?
                .queries()
                .get_key(&args.signature)
                .await?
                .ok_or_else(|| DomainError::key_not_found(&args.signature))?;
            print_json(&view)
        }
        Command::List(args) => list(&service().await?, args).await,
        Command::Lineage(args) => lineage(&service().await?, args).await,
    }
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let StorageConfig::Postgres { config: pg, .. } = StorageConfig::from_settings(&config.storage)?
    else {
        bail!("Migrations require the postgres storage backend");
    };

    let pool = pg.connect().await?;
    let applied = run_signing_migrations(&pool).await?;

    info!("Migrations finished: applied={}", applied);
    print_json(&json!({ "applied": applied }))
}

async fn issue(service: &Service, args: IssueArgs) -> anyhow::Result<()> {
    let mut request = NewSigningKey::new()
        .with_scope(args.scope)
        .expires_in_hours(args.expiration_hours)
        .with_active(!args.inactive);

    if let Some(email) = args.email {
        request = request.with_email(email);
    }

    if let Some(previous_key) = args.previous_key {
        request = request.with_previous_key(previous_key);
    }

    let signature = service.issue(request).await?;
    let view = service.queries().get_key(&signature).await?;

    print_json(&view)
}

async fn verify(service: &Service, args: VerifyArgs) -> anyhow::Result<()> {
    let scope = Scope::from(args.scope);
    service.check_valid(&args.signature, scope.clone()).await?;

    print_json(&json!({ "valid": true, "scope": scope }))
}

async fn rotate(service: &Service, args: RotateArgs) -> anyhow::Result<()> {
    let options = RotateOptions {
        expiration_hours: args.expiration_hours,
        overwrite_scope: args.scope.map(Scope::from),
    };

    let new_signature = service.rotate(&args.signature, options).await?;

    print_json(&json!({
        "old_signature": args.signature,
        "new_signature": new_signature,
    }))
}

async fn rotate_expiring(service: &Service, args: RotateExpiringArgs) -> anyhow::Result<()> {
    let selection = RotateExpiring {
        within_hours: args.within_hours,
        scope: Scope::from(args.scope),
        only_active: !args.inactive,
        overwrite_scope: args.overwrite_scope.map(Scope::from),
    };

    if !args.keep_going {
        let rotated = service.rotate_expiring(selection).await?;
        return print_json(&rotated);
    }

    let report = service.rotate_expiring_collecting(selection).await?;
    let failed: Vec<_> = report
        .failed
        .iter()
        .map(|failure| {
            json!({
                "signature": failure.signature,
                "error": failure.error.kind(),
                "message": failure.error.to_string(),
            })
        })
        .collect();

    print_json(&json!({ "rotated": report.rotated, "failed": failed }))?;

    if !report.is_complete() {
        bail!("{} key(s) could not be rotated", report.failed.len());
    }

    Ok(())
}

async fn list(service: &Service, args: ListArgs) -> anyhow::Result<()> {
    let mut filter = KeyFilter::new().with_scopes(args.scope);

    if let Some(active) = args.active {
        filter = filter.with_active(active);
    }

    if let Some(email) = args.email {
        filter = filter.with_email(email);
    }

    if let Some(previous_key) = args.previous_key {
        filter = filter.with_previous_key(previous_key);
    }

    let queries = service.queries();
    let keys: Vec<KeyView> = if filter.is_unfiltered() {
        queries.get_all().await?
    } else {
        queries.query(&filter).await?
    };

    print_json(&keys)
}

async fn lineage(service: &Service, args: LineageArgs) -> anyhow::Result<()> {
    let queries = service.queries();

    let chain = if args.successors {
        queries.successors(&args.signature).await?
    } else {
        queries.lineage(&args.signature).await?
    };

    print_json(&chain)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SignatureArg;

    #[tokio::test]
    async fn test_migrate_requires_postgres_backend() {
        let result = execute(Command::Migrate, &AppConfig::default()).await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("postgres storage backend"));
    }

    #[tokio::test]
    async fn test_key_commands_open_the_store() {
        let config = AppConfig::default();

        let list = ListArgs {
            scope: Vec::new(),
            active: None,
            email: None,
            previous_key: None,
        };
        execute(Command::List(list), &config).await.unwrap();

        let show = SignatureArg {
            signature: "missing".to_string(),
        };
        let result = execute(Command::Show(show), &config).await;
        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<DomainError>(),
            Some(DomainError::KeyNotFound { .. })
        ));
    }
}
