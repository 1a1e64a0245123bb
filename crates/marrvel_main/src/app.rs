use std::sync::Arc;

use anyhow::Context;
use marrvel_app::{BatchRunner, EvalContext, RunOptions, TestRunner, ToolRegistry};
use marrvel_config::EvalConfig;
use marrvel_domain::{
    ChatModel, McpClient, Mode, ModelId, ResultCache, RunId, TestCase, TokenCounter,
    parse_subset,
};
use marrvel_infra::{CacacheResultCache, MarrvelMcpClient, OpenAiCompatProvider};
use tracing::info;

use crate::cli::{CacheCommand, Cli, Command, RunArgs};
use crate::logging::init_tracing;
use crate::report::{default_report_path, write_report};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = EvalConfig::load(cli.config.as_deref())?;
    if let Command::Run(args) = &cli.command {
        if !args.models.is_empty() {
            config.models = args.models.clone();
        }
        if let Some(concurrency) = args.concurrency {
            config.concurrency = concurrency;
        }
    }
    let _guard = init_tracing(&config.log_dir())?;

    match cli.command {
        Command::Run(args) => run_batch(config, args).await,
        Command::Tools => list_tools(config).await,
        Command::Cache { command: CacheCommand::Clear { run_id } } => {
            let cache = CacacheResultCache::new(config.cache_dir());
            cache.clear(run_id.as_ref()).await?;
            match run_id {
                Some(run_id) => println!("Cleared run {run_id}"),
                None => println!("Cleared {}", cache.root().display()),
            }
            Ok(())
        }
    }
}

async fn run_batch(config: EvalConfig, args: RunArgs) -> anyhow::Result<()> {
    config.validate()?;

    let cases = TestCase::load(&args.tests).await?;
    let selected: Vec<(usize, TestCase)> = match &args.subset {
        Some(subset) => {
            let indices = parse_subset(subset, cases.len())
                .with_context(|| format!("Invalid subset '{subset}'"))?;
            indices.into_iter().map(|index| (index, cases[index].clone())).collect()
        }
        None => cases.into_iter().enumerate().collect(),
    };

    let tools = match args.mode {
        Mode::Tool => {
            let client: Arc<dyn McpClient> = Arc::new(MarrvelMcpClient::new(config.mcp.clone()));
            ToolRegistry::from_mcp(client)
                .await
                .context("Failed to list MCP tools")?
        }
        Mode::Vanilla | Mode::Web => ToolRegistry::new(),
    };

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.provider.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let provider = |model: &str| -> anyhow::Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OpenAiCompatProvider::with_client(
            http.clone(),
            &config.provider,
            ModelId::new(model),
        )?))
    };
    let evaluator = provider(config.evaluator_model.as_str())?;
    let models = config
        .models
        .iter()
        .map(|model| provider(model.as_str()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cache_dir = config.cache_dir();
    let cache: Arc<dyn ResultCache> = Arc::new(CacacheResultCache::new(cache_dir.clone()));
    let context = EvalContext::new(
        Arc::new(tools),
        cache,
        evaluator,
        TokenCounter::shared(),
        config.limits.clone(),
        config.retry.clone(),
        config.concurrency,
    );

    let run_id = args.run_id.unwrap_or_else(RunId::generate);
    let options = RunOptions::new(run_id, args.mode)
        .retry_failed(args.retry_failed)
        .retry_errors(args.retry_errors);
    info!(
        run_id = %options.run_id,
        tests = selected.len(),
        models = ?config.models,
        evaluator = %config.evaluator_model,
        "Evaluating"
    );

    let batch = BatchRunner::new(Arc::new(TestRunner::new(Arc::new(context))));
    let report = batch.run(selected, models, options).await;

    let path = args
        .output
        .unwrap_or_else(|| default_report_path(&cache_dir, &report));
    write_report(&path, &report).await?;

    println!(
        "run {}: {} yes, {} no, {} failed of {} -> {}",
        report.run_id,
        report.stats.yes,
        report.stats.no,
        report.stats.failed,
        report.stats.total(),
        path.display()
    );
    Ok(())
}

async fn list_tools(config: EvalConfig) -> anyhow::Result<()> {
    let client = MarrvelMcpClient::new(config.mcp);
    for tool in client.list().await? {
        println!("{}\t{}", tool.name, tool.description.lines().next().unwrap_or_default());
    }
    Ok(())
}
