use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use shelter_engine::{
    Destination, Effect, Engine, EngineConfig, EngineConfigBuilder, Event, Fetcher, FileStore,
    PartitionStore, ProxyRequest, ShelterError,
};
use tracing::{info, warn};

use crate::cli::{CliArgs, ConfigAction};
use crate::config::AppConfig;
use crate::error::AppError;

/// Apply command-line overrides to the loaded configuration
pub fn apply_overrides(args: &CliArgs, mut config: AppConfig) -> Result<AppConfig, AppError> {
    let mut builder = EngineConfigBuilder::from_config(config.engine);
    if let Some(origin) = &args.origin {
        builder = builder.with_origin(origin.clone());
    }
    if let Some(version) = &args.version_token {
        builder = builder.with_version(version.clone());
    }
    config.engine = builder.build()?;

    if let Some(dir) = &args.cache_dir {
        config.store.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Open the file store when a cache directory is configured, otherwise a
/// memory store
pub fn open_store(cache_dir: Option<&Path>, engine: &EngineConfig) -> Arc<dyn PartitionStore> {
    match cache_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Using file partition store");
            Arc::new(FileStore::new(dir))
        }
        None => {
            warn!("Using memory partition store, nothing survives this process");
            Arc::new(Engine::memory_store(engine))
        }
    }
}

pub fn build_engine(config: &AppConfig) -> Result<Arc<Engine>, AppError> {
    let store = open_store(config.store.cache_dir.as_deref(), &config.engine);
    Ok(Arc::new(Engine::with_http(config.engine.clone(), store)?))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(ShelterError::from)?;
    println!("{json}");
    Ok(())
}

pub async fn install(config: &AppConfig) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    let installed = engine.install().await?;
    let activated = engine.activate().await?;
    print_json(&serde_json::json!({
        "install": installed,
        "activate": activated,
    }))
}

pub async fn sync(config: &AppConfig, tag: Option<&str>) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    let tag = tag.unwrap_or(&config.engine.sync_tag);
    match engine.sync(tag).await? {
        Some(report) => print_json(&report),
        None => {
            println!("Ignored sync tag {tag:?}");
            Ok(())
        }
    }
}

/// One line per URL: class, strategy and partition
pub fn classify_lines(engine: &Engine, urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|url| {
            let class = engine.classify(url);
            let (strategy, role) = class.route();
            format!("{url}\t{class}\t{strategy}\t{}", engine.cache().name(role))
        })
        .collect()
}

pub fn classify(config: &AppConfig, urls: &[String]) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    for line in classify_lines(&engine, urls) {
        println!("{line}");
    }
    Ok(())
}

pub async fn fetch(config: &AppConfig, url: &str, destination: Destination) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    // Only an active version answers from its partitions
    if engine.restore().await? {
        engine.activate().await?;
    } else {
        warn!(version = %engine.version(), "Version not installed, fetching from the network");
    }

    let url = config.engine.resolve(url).map_err(ShelterError::from)?;
    let request = ProxyRequest::get(url).with_destination(destination);

    let effect = engine.dispatch(Event::Fetch(request)).await?;
    engine.settle().await;
    let response = match effect {
        Effect::Respond(response) => response,
        Effect::Passthrough(request) => engine.fetcher().fetch(&request).await?,
        Effect::NoResponse(reason) => {
            return Err(AppError::InvalidInput(format!("No response: {reason}")));
        }
        other => return Err(AppError::InvalidInput(format!("Unexpected outcome: {other:?}"))),
    };

    println!(
        "{} {:?} {} bytes {}",
        response.status,
        response.source,
        response.body.len(),
        response.content_type().unwrap_or("-")
    );
    Ok(())
}

pub async fn partitions(config: &AppConfig) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    let current = engine.cache().partitions();
    for name in engine.cache().store().partitions().await? {
        let marker = if current.contains(&name) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

pub async fn cache_urls(config: &AppConfig, urls: &[String]) -> Result<(), AppError> {
    let engine = build_engine(config)?;
    let stored = engine.cache_urls(urls).await?;
    println!("Cached {stored} URLs into {}", engine.cache().name(shelter_engine::PartitionRole::Dynamic));
    Ok(())
}

pub fn config_action(
    action: &ConfigAction,
    config: &AppConfig,
    path: Option<&Path>,
) -> Result<(), AppError> {
    match action {
        ConfigAction::Show => {
            println!("{}", config.show()?);
        }
        ConfigAction::Init { force } => {
            let path = path
                .map(Path::to_path_buf)
                .or_else(AppConfig::default_config_path)
                .ok_or_else(|| AppError::InvalidInput("No configuration path available".into()))?;
            if path.exists() && !force {
                return Err(AppError::InvalidInput(format!(
                    "{} already exists, use --force to overwrite",
                    path.display()
                )));
            }
            AppConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config_for(args: &[&str]) -> AppConfig {
        let args = CliArgs::try_parse_from(args).unwrap();
        apply_overrides(&args, AppConfig::default()).unwrap()
    }

    #[test]
    fn test_overrides_apply() {
        let config = config_for(&[
            "shelter",
            "--origin",
            "https://white.plus/",
            "--version-token",
            "v9",
            "--cache-dir",
            "/tmp/shelter",
            "partitions",
        ]);
        assert_eq!(config.engine.origin.as_str(), "https://white.plus/");
        assert_eq!(config.engine.version, "v9");
        assert_eq!(
            config.store.cache_dir.as_deref(),
            Some(Path::new("/tmp/shelter"))
        );
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let args = CliArgs::try_parse_from(["shelter", "--origin", "nope", "partitions"]).unwrap();
        assert!(apply_overrides(&args, AppConfig::default()).is_err());
    }

    #[test]
    fn test_classify_lines() {
        let config = config_for(&["shelter", "--origin", "https://white.plus/", "partitions"]);
        let engine = build_engine(&config).unwrap();
        let lines = classify_lines(
            &engine,
            &["/app.js".to_string(), "/img/poster.jpg".to_string(), "/api/plans".to_string()],
        );
        assert_eq!(
            lines,
            vec![
                "/app.js\tstatic\tcache-first\twhite-plus-static-v1.0.0",
                "/img/poster.jpg\timage\tcache-first\twhite-plus-images-v1.0.0",
                "/api/plans\tnetwork-first\tnetwork-first\twhite-plus-dynamic-v1.0.0",
            ]
        );
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig::default();

        config_action(&ConfigAction::Init { force: false }, &config, Some(&path)).unwrap();
        assert!(path.exists());
        assert!(config_action(&ConfigAction::Init { force: false }, &config, Some(&path)).is_err());
        config_action(&ConfigAction::Init { force: true }, &config, Some(&path)).unwrap();
    }
}
