use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_account_deployer::chain::{LocalSigner, RpcChainClient, Signer};
use smart_account_deployer::config::{ChainEndpointProfile, DeployerConfig};
use smart_account_deployer::deploy::{self, ContractRegistry, PLUGIN_MANAGER};
use smart_account_deployer::keystore::{CosmosKey, KeyManager, KeyManagerConfig};
use smart_account_deployer::metrics::DeployerMetrics;
use smart_account_deployer::workflow::{
    AccountActivationWorkflow, Journal, PluginPlan, SignerIdentity, WorkflowContext, WorkflowDriver,
    WorkflowPlan, WorkflowState,
};
use smart_account_deployer::SmartAccountDescriptor;

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Pyxis smart-account deployer for Aura chains")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/deployer.toml")]
    pub config: String,

    /// Chain profile key (falls back to $CHAIN_ID, then "local")
    #[arg(long)]
    pub chain: Option<String>,

    /// Log level (falls back to `log_level` in the config file)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload contract artifacts that have no code id yet
    Upload,
    /// Instantiate the plugin manager
    SetupPluginManager,
    /// Instantiate the recovery plugin and allow it on the plugin manager
    SetupRecoveryPlugin,
    /// Print the smart-account address for the configured descriptor
    Derive,
    /// Drive the smart account through the workflow, resuming from the journal
    Activate {
        /// Stop once this state is reached
        #[arg(long, default_value = "plugin_unregistered")]
        until: WorkflowState,
    },
    /// Show journaled workflow progress
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = DeployerConfig::load_or_default(&cli.config)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter(cli.log_level.as_deref()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Loaded configuration from: {}", cli.config);

    match cli.command {
        Commands::Upload => {
            let profile = config.select_chain(cli.chain.as_deref())?;
            upload(&mut config, profile).await?;
            config.save(&cli.config)?;
        }
        Commands::SetupPluginManager => {
            let profile = config.select_chain(cli.chain.as_deref())?;
            setup_plugin_manager(&mut config, profile).await?;
            config.save(&cli.config)?;
        }
        Commands::SetupRecoveryPlugin => {
            let profile = config.select_chain(cli.chain.as_deref())?;
            let result = setup_recovery_plugin(&mut config, profile).await;
            config.save(&cli.config)?;
            result?;
        }
        Commands::Derive => {
            let profile = config.select_chain(cli.chain.as_deref())?;
            derive(&config, profile).await?;
        }
        Commands::Activate { until } => {
            let profile = config.select_chain(cli.chain.as_deref())?;
            activate(&config, profile, until).await?;
        }
        Commands::Status => show_status(&config)?,
    }

    Ok(())
}

fn key_manager(config: &DeployerConfig, profile: &ChainEndpointProfile) -> KeyManager {
    KeyManager::new(KeyManagerConfig {
        env_prefix: config.global.key_env_prefix.clone(),
        address_prefix: profile.address_prefix.clone(),
    })
}

fn load_key(keys: &mut KeyManager, name: &str) -> anyhow::Result<CosmosKey> {
    keys.load_key(name)
        .with_context(|| format!("Failed to load signing key {:?}", name))
}

fn signing_client(
    profile: &ChainEndpointProfile,
    key: CosmosKey,
    config: &DeployerConfig,
) -> anyhow::Result<RpcChainClient> {
    Ok(RpcChainClient::new(profile.clone())?
        .with_signer(Arc::new(LocalSigner::new(key)))
        .with_gas_limits(config.account.gas.clone()))
}

async fn upload(config: &mut DeployerConfig, profile: ChainEndpointProfile) -> anyhow::Result<()> {
    let mut keys = key_manager(config, &profile);
    let key = load_key(&mut keys, &config.account.funding_key)?;
    let sender = key.address.clone();
    let client = signing_client(&profile, key, config)?;

    let mut registry = ContractRegistry::new(config.contracts.clone());
    let uploaded = deploy::upload_contracts(&client, &sender, &mut registry).await?;
    config.contracts = registry.into_records();

    for name in uploaded {
        if let Some(record) = config.get_contract(&name) {
            println!("{}: code id {}", name, record.code_id.unwrap_or_default());
        }
    }
    Ok(())
}

async fn setup_plugin_manager(config: &mut DeployerConfig, profile: ChainEndpointProfile) -> anyhow::Result<()> {
    let mut keys = key_manager(config, &profile);
    let key = load_key(&mut keys, &config.account.funding_key)?;
    let deployer = key.address.clone();
    let client = signing_client(&profile, key, config)?;

    let mut registry = ContractRegistry::new(config.contracts.clone());
    let address = deploy::setup_plugin_manager(&client, &deployer, &mut registry).await?;
    config.contracts = registry.into_records();

    println!("plugin manager: {}", address);
    Ok(())
}

async fn setup_recovery_plugin(config: &mut DeployerConfig, profile: ChainEndpointProfile) -> anyhow::Result<()> {
    let mut keys = key_manager(config, &profile);
    let key = load_key(&mut keys, &config.account.funding_key)?;
    let deployer = key.address.clone();
    let client = signing_client(&profile, key, config)?;

    let mut registry = ContractRegistry::new(config.contracts.clone());
    let result = deploy::setup_recovery_plugin(&client, &deployer, &mut registry).await;
    // An instantiated address is kept even if allow-listing failed
    config.contracts = registry.into_records();
    let address = result?;

    println!("{}: {}", deploy::SIMPLE_RECOVERY_PLUGIN, address);
    Ok(())
}

fn descriptor(config: &DeployerConfig, key: &CosmosKey) -> anyhow::Result<SmartAccountDescriptor> {
    let manager = config
        .get_contract(PLUGIN_MANAGER)
        .and_then(|c| c.contract_address.clone())
        .context("Plugin manager has no contract address; run setup-plugin-manager first")?;

    Ok(SmartAccountDescriptor::new(
        config.account.code_id,
        &config.account.salt,
        &manager,
        key.public_key.clone(),
    ))
}

fn identity(key: CosmosKey) -> SignerIdentity {
    let address = key.address.clone();
    let public_key = key.public_key.clone();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(key));
    SignerIdentity::new(&address, public_key, signer)
}

async fn derive(config: &DeployerConfig, profile: ChainEndpointProfile) -> anyhow::Result<()> {
    let mut keys = key_manager(config, &profile);
    let key = load_key(&mut keys, &config.account.funding_key)?;
    let descriptor = descriptor(config, &key)?;

    let client = Arc::new(RpcChainClient::new(profile.clone())?);
    let ctx = WorkflowContext::new(client.clone(), client, identity(key));
    let workflow = AccountActivationWorkflow::new(&profile, config.account.gas.clone());

    let address = workflow.derive_address(&ctx, &descriptor).await?;
    println!("{}", address);
    Ok(())
}

async fn activate(config: &DeployerConfig, profile: ChainEndpointProfile, until: WorkflowState) -> anyhow::Result<()> {
    let mut keys = key_manager(config, &profile);
    let funding_key = load_key(&mut keys, &config.account.funding_key)?;
    let recoverer_key = load_key(&mut keys, &config.account.recoverer_key)?;
    let descriptor = descriptor(config, &funding_key)?;

    let plugin = if until >= WorkflowState::PluginRegistered {
        let record = config
            .get_contract(&config.account.recovery_plugin)
            .with_context(|| format!("Unknown recovery plugin {:?}", config.account.recovery_plugin))?;
        PluginPlan {
            plugin_address: record
                .contract_address
                .clone()
                .with_context(|| format!("{} has no contract address; run setup-recovery-plugin first", record.name))?,
            checksum: record
                .checksum
                .clone()
                .with_context(|| format!("{} has no code checksum; run setup-recovery-plugin first", record.name))?,
            recover_address: recoverer_key.address.clone(),
        }
    } else {
        PluginPlan {
            plugin_address: String::new(),
            checksum: String::new(),
            recover_address: recoverer_key.address.clone(),
        }
    };

    let rotated = if until >= WorkflowState::KeyRotated {
        identity(load_key(&mut keys, &config.account.rotated_key)?)
    } else {
        identity(recoverer_key.clone())
    };

    let client = Arc::new(RpcChainClient::new(profile.clone())?.with_gas_limits(config.account.gas.clone()));
    let ctx = WorkflowContext::new(client.clone(), client, identity(funding_key))
        .with_recoverer(identity(recoverer_key));

    let metrics = Arc::new(DeployerMetrics::new()?);
    let workflow =
        AccountActivationWorkflow::new(&profile, config.account.gas.clone()).with_metrics(metrics.clone());
    let driver = WorkflowDriver::new(workflow, Journal::new(config.journal_dir()));

    let plan = WorkflowPlan {
        descriptor,
        fund_amount: config.account.fund_amount as u128,
        fund_denom: profile.fee_denom.clone(),
        plugin,
        rotated,
        credentials: config.account.credentials.clone(),
        until,
    };

    let result = driver.run(ctx, &plan).await;
    debug!("Metrics:\n{}", metrics.render());

    let outcome = result?;
    println!("{}: {}", outcome.address, outcome.state);
    Ok(())
}

fn show_status(config: &DeployerConfig) -> anyhow::Result<()> {
    let dir = config.journal_dir();
    let entries = Journal::new(&dir).list()?;

    if entries.is_empty() {
        println!("No journaled accounts in {}", dir.display());
        return Ok(());
    }

    for entry in entries {
        let state = entry
            .last_completed
            .map(|s| s.reaches().to_string())
            .unwrap_or_else(|| "new".to_string());
        print!("{}  {}  (updated {})", entry.smart_account_address, state, entry.updated_at);
        if let Some(pending) = &entry.pending {
            print!("  pending {} tx {}", pending.step, pending.hashes().collect::<Vec<_>>().join(","));
        }
        println!();
    }
    Ok(())
}
