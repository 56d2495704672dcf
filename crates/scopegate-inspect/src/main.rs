//! scopegate-inspect: prints the effective permissions of a catalog.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use scopegate_core::error::{ScopegateError, ScopegateResult};
use scopegate_core::models::profile::{Profile, ProfileKind};
use scopegate_engine::diagnostics::explain_field;
use scopegate_engine::seed::{assign_default_role, default_catalog};
use scopegate_engine::snapshot::CatalogDocument;
use scopegate_engine::{
    AccessEngine, CatalogSnapshot, EngineConfig, InMemoryCache, InMemoryCatalog,
    PermissionSummary, RbacSummary,
};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, OutputFormat};

type Engine = AccessEngine<Arc<InMemoryCatalog>, Arc<InMemoryCache>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "inspection failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ScopegateResult<()> {
    let snapshot = load_catalog(&cli)?;
    let catalog = Arc::new(InMemoryCatalog::new(snapshot));
    let engine = AccessEngine::new(
        catalog.clone(),
        Arc::new(InMemoryCache::new()),
        EngineConfig::default(),
    );

    match cli.command {
        Command::Profile {
            username,
            entity,
            kind,
            profile_type,
        } => {
            let kind = kind.map(ProfileKind::from);
            let profile = find_or_create_profile(&catalog, &engine, &username, kind, profile_type)?;
            let entity_types: Vec<String> = match entity {
                Some(entity) => vec![entity],
                None => catalog
                    .snapshot()
                    .schemas
                    .entity_types()
                    .map(str::to_string)
                    .collect(),
            };
            let summaries = entity_types
                .iter()
                .map(|et| PermissionSummary::build(&engine, profile.id, et))
                .collect::<ScopegateResult<Vec<_>>>()?;
            match cli.format {
                OutputFormat::Json => print_json(&summaries)?,
                OutputFormat::Text => {
                    for summary in summaries {
                        println!("{summary}");
                    }
                }
            }
        }
        Command::Rbac => {
            let summary = RbacSummary::build(&engine)?;
            match cli.format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Text => print!("{summary}"),
            }
        }
        Command::Explain { scope, field } => {
            let source = explain_field(&engine, &scope, &field)?;
            match cli.format {
                OutputFormat::Json => print_json(&source.to_string())?,
                OutputFormat::Text => println!("{scope}.{field}: {source}"),
            }
        }
    }
    Ok(())
}

fn load_catalog(cli: &Cli) -> ScopegateResult<CatalogSnapshot> {
    let Some(path) = &cli.catalog else {
        info!("using the built-in catalog");
        return default_catalog();
    };
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ScopegateError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let document: CatalogDocument = serde_json::from_str(&raw).map_err(|e| {
        ScopegateError::Configuration(format!("invalid catalog {}: {e}", path.display()))
    })?;
    info!(
        path = %path.display(),
        scopes = document.scopes.len(),
        roles = document.roles.len(),
        profiles = document.profiles.len(),
        "loaded catalog"
    );
    Ok(document.into())
}

fn find_or_create_profile(
    catalog: &InMemoryCatalog,
    engine: &Engine,
    username: &str,
    kind: Option<ProfileKind>,
    profile_type: Option<String>,
) -> ScopegateResult<Profile> {
    let snapshot = catalog.snapshot();
    let existing = snapshot
        .profiles
        .values()
        .find(|p| p.username == username && kind.is_none_or(|k| p.kind == k));
    if let Some(profile) = existing {
        return Ok(profile.clone());
    }

    let kind = kind.ok_or_else(|| ScopegateError::not_found("profile", username))?;
    let mut profile = Profile::new(kind, username);
    if let Some(profile_type) = profile_type {
        profile.profile_type = profile_type;
    }
    let change = catalog.insert_profile(assign_default_role(&snapshot, profile))?;
    engine.apply_all(&change.events);
    info!(profile = %change.value.username, kind = %kind, "created transient profile");
    Ok(change.value)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ScopegateResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| ScopegateError::Internal(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
