use anyhow::{Context, Result, anyhow};
use clap::Parser;
use genealogy_records::{AccessConfig, Caller, FilterSpec, InMemoryStorage, RecordSet, RequestContext, SchemaRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "records")]
#[command(about = "Browse genealogy records loaded from a JSON seed file")]
struct Cli {
    /// Seed document mapping entity names to lists of rows
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Access settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entity or table name, e.g. Locations or tblLR
    #[arg(long)]
    entity: String,

    /// Filter parameter as name=value; repeatable. limit, offset and order
    /// are recognized.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Print the distinct values of this field instead of the records
    #[arg(long)]
    distinct: Option<String>,

    /// Browse as this user instead of an anonymous visitor
    #[arg(long)]
    user: Option<String>,
}

fn parse_param(text: &str) -> std::result::Result<(String, String), String> {
    text.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", text))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            AccessConfig::from_json(&json).context("invalid access configuration")?
        }
        None => AccessConfig::default(),
    };

    let caller = match cli.user {
        Some(name) => Caller::editor(name),
        None => Caller::anonymous(),
    };
    let storage = InMemoryStorage::for_registry(SchemaRegistry::global()).context("failed to create tables")?;
    let ctx = RequestContext::new(Arc::new(storage), caller).with_config(config);

    if let Some(path) = &cli.seed {
        genealogy_records::seed::load_seed_file(&ctx, path)
            .await
            .with_context(|| format!("failed to load seed {}", path.display()))?;
    }

    let spec = FilterSpec::from_params(cli.params, ctx.config()).context("invalid filter parameters")?;
    let set = RecordSet::new(&ctx, &cli.entity, &spec).with_context(|| format!("cannot query {}", cli.entity))?;

    let output = match &cli.distinct {
        Some(field) => serde_json::json!({
            "field": field,
            "values": set.get_distinct(field).await?,
        }),
        None => {
            let records: Vec<serde_json::Value> = set
                .records()
                .await?
                .map(|record| {
                    record
                        .fields()
                        .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
                        .collect::<serde_json::Map<_, _>>()
                        .into()
                })
                .collect();
            serde_json::json!({
                "information": set.information().await?,
                "records": records,
            })
        }
    };

    let text = serde_json::to_string_pretty(&output).map_err(|e| anyhow!("cannot render output: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genealogy_records=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
