//! Alphacore CLI - wallet files in, JSON out.
//!
//!   alphacore generate [--with-mnemonic]       → new wallet, saved to the store
//!   alphacore restore --mnemonic <words>       → wallet from a BIP39 phrase
//!   alphacore import <file> [--password <pw>]  → .dat / text / JSON v1, verified
//!   alphacore export --format text|json        → render the stored wallet
//!   alphacore derive [--index N] [--change]    → address at an index
//!   alphacore inspect <address>                → decode an address
//!
//! Store location: --data-dir, else $ALPHACORE_ROOT/<app>/data, else the
//! platform data directory.
//!
//! Output format:
//!   --json     Compact JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use alphacore::logging::init_logging;
use alphacore::{formats, inspect, KeyManager, Network, Wallet, WalletConfig, WalletFormat, WalletStore};
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use tracing::{debug, info};

const DEFAULT_APP: &str = "alphacore";

#[tokio::main]
async fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("alphacore {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("generate") | Some("new") => cmd_generate(&opts),
        Some("restore") => cmd_restore(&opts),
        Some("import") => cmd_import(&opts).await,
        Some("export") => cmd_export(&opts),
        Some("derive") => cmd_derive(&opts),
        Some("inspect") => cmd_inspect(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    app: Option<String>,
    network: Option<String>,
    data_dir: Option<String>,
    mnemonic: Option<String>,
    passphrase: Option<String>,
    password: Option<String>,
    format: Option<String>,
    out: Option<String>,
    index: Option<u32>,
    change: bool,
    with_mnemonic: bool,
    no_save: bool,
    force: bool,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let mut value = || {
                i += 1;
                args.get(i).cloned()
            };
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--change" => opts.change = true,
                "--with-mnemonic" => opts.with_mnemonic = true,
                "--no-save" => opts.no_save = true,
                "--force" => opts.force = true,
                "--app" | "-a" => opts.app = value(),
                "--network" | "-n" => opts.network = value(),
                "--data-dir" | "-d" => opts.data_dir = value(),
                "--mnemonic" | "-m" => opts.mnemonic = value(),
                "--passphrase" => opts.passphrase = value(),
                "--password" | "-p" => opts.password = value(),
                "--format" | "-f" => opts.format = value(),
                "--out" | "-o" => opts.out = value(),
                "--index" | "-i" => opts.index = value().and_then(|v| v.parse().ok()),
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command, second its target
        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.target = Some(positional.remove(0));
        }

        // Environment variables (lower priority than CLI args)
        if opts.app.is_none() {
            opts.app = env::var("ALPHACORE_APP").ok().filter(|s| !s.is_empty());
        }
        if opts.network.is_none() {
            opts.network = env::var("ALPHACORE_NETWORK").ok().filter(|s| !s.is_empty());
        }
        if opts.data_dir.is_none() {
            opts.data_dir = env::var("ALPHACORE_DATA_DIR").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn config(&self) -> anyhow::Result<WalletConfig> {
        let network = match self.network.as_deref() {
            Some(raw) => Network::from_str(raw).ok_or_else(|| anyhow!("Invalid network: {}", raw))?,
            None => Network::default(),
        };
        let mut config = WalletConfig { network, ..Default::default() };
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        Ok(config)
    }

    fn store(&self, config: &WalletConfig) -> WalletStore {
        config.store(self.app.as_deref().unwrap_or(DEFAULT_APP))
    }
}

fn print_usage() {
    println!(
        r#"alphacore - wallet core CLI

USAGE:
    alphacore <command> [target] [options]

COMMANDS:
    generate                Create a new wallet and save it
    restore                 Restore a wallet from a BIP39 mnemonic
    import <file>           Import a .dat, text or JSON v1 wallet file
    export                  Export the stored wallet as text or JSON
    derive                  Derive an address of the stored wallet
    inspect <address>       Decode an address

OPTIONS:
    --app, -a <name>        Application name (default: alphacore, env: ALPHACORE_APP)
    --network, -n <net>     mainnet|testnet (env: ALPHACORE_NETWORK)
    --data-dir, -d <path>   Wallet directory (env: ALPHACORE_DATA_DIR)
    --with-mnemonic         generate: derive the wallet from a new 12-word phrase
    --mnemonic, -m <words>  restore: BIP39 phrase
    --passphrase <text>     restore: BIP39 passphrase
    --password, -p <pw>     import/export: file password
    --format, -f <fmt>      export: text|json (default: json)
    --out, -o <file>        export: write to file instead of stdout
    --index, -i <n>         derive: address index (default: next unused)
    --change                derive: use the change chain
    --no-save               do not write the wallet store
    --force                 overwrite an existing stored wallet

OUTPUT OPTIONS:
    --json                  Compact JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

EXAMPLES:
    alphacore generate --with-mnemonic --network testnet
    alphacore import old-wallet.dat --password hunter2
    alphacore export --format text --password hunter2 --out backup.txt
    alphacore derive --index 5 --change
    alphacore inspect alpha1q...
"#
    );
}

fn wallet_summary(wallet: &Wallet) -> Value {
    json!({
        "derivationMode": wallet.derivation_mode.as_str(),
        "descriptorPath": wallet.descriptor_path,
        "source": wallet.source.as_str(),
        "addresses": wallet
            .addresses
            .iter()
            .map(|a| json!({"address": a.address, "path": a.path, "isChange": a.is_change}))
            .collect::<Vec<_>>(),
    })
}

fn persist(opts: &ParsedArgs, config: &WalletConfig, wallet: &Wallet) -> anyhow::Result<Option<String>> {
    if opts.no_save {
        return Ok(None);
    }
    let store = opts.store(config);
    if store.exists() && !opts.force {
        bail!("A wallet already exists at {} (use --force to replace it)", store.path().display());
    }
    store.save(wallet).context("Failed to save wallet")?;
    Ok(Some(store.path().display().to_string()))
}

fn load_wallet(opts: &ParsedArgs, config: &WalletConfig) -> anyhow::Result<Wallet> {
    let store = opts.store(config);
    store
        .load()
        .context("Failed to load wallet")?
        .ok_or_else(|| anyhow!("No wallet at {}. Run 'alphacore generate' first.", store.path().display()))
}

fn cmd_generate(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let (mut wallet, mnemonic) = if opts.with_mnemonic {
        let (wallet, phrase) = Wallet::generate_with_mnemonic()?;
        (wallet, Some(phrase))
    } else {
        (Wallet::generate()?, None)
    };
    let first = wallet.next_address(config.hrp())?;
    let saved = persist(opts, &config, &wallet)?;
    info!(network = config.network.as_str(), "wallet generated");

    let mut output = wallet_summary(&wallet);
    output["firstAddress"] = json!(first.address);
    output["savedTo"] = json!(saved);
    if let Some(phrase) = mnemonic {
        output["mnemonic"] = json!(phrase);
    }
    Ok(output)
}

fn cmd_restore(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let phrase = opts
        .mnemonic
        .as_deref()
        .or(opts.target.as_deref())
        .ok_or_else(|| anyhow!("Missing --mnemonic"))?;
    let mut wallet = Wallet::from_mnemonic(phrase, opts.passphrase.as_deref().unwrap_or(""))?;
    wallet.next_address(config.hrp())?;
    let saved = persist(opts, &config, &wallet)?;

    let mut output = wallet_summary(&wallet);
    output["savedTo"] = json!(saved);
    Ok(output)
}

async fn cmd_import(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let file = opts.target.as_deref().ok_or_else(|| anyhow!("Missing wallet file"))?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file))?;
    let format = formats::detect(&bytes)?;
    debug!(file, format = format.as_str(), "detected wallet format");

    let wallet = formats::import(&bytes, opts.password.as_deref(), &config).await?;
    let saved = persist(opts, &config, &wallet)?;

    let mut output = wallet_summary(&wallet);
    output["format"] = json!(format.as_str());
    output["savedTo"] = json!(saved);
    Ok(output)
}

fn cmd_export(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let wallet = load_wallet(opts, &config)?;
    let format = match opts.format.as_deref() {
        Some(raw) => WalletFormat::from_str(raw).ok_or_else(|| anyhow!("Invalid format: {}", raw))?,
        None => WalletFormat::Json,
    };
    let content = formats::export(&wallet, format, opts.password.as_deref(), &config)?;

    match &opts.out {
        Some(path) => {
            std::fs::write(path, &content).with_context(|| format!("Failed to write {}", path))?;
            Ok(json!({"format": format.as_str(), "writtenTo": path, "encrypted": opts.password.is_some()}))
        }
        None => Ok(json!({"format": format.as_str(), "encrypted": opts.password.is_some(), "content": content})),
    }
}

fn cmd_derive(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let mut wallet = load_wallet(opts, &config)?;
    let (address, added) = match opts.index {
        Some(index) => {
            let manager = KeyManager::from_wallet(&wallet, config.hrp())?;
            let address = manager.derive_address(index, opts.change)?;
            let added = wallet.add_address(address.clone())?;
            (address, added)
        }
        None if !opts.change => (wallet.next_address(config.hrp())?, true),
        None => bail!("--change needs an explicit --index"),
    };
    if added && !opts.no_save {
        opts.store(&config).save(&wallet).context("Failed to save wallet")?;
    }
    Ok(json!({
        "address": address.address,
        "path": address.path,
        "index": address.index,
        "isChange": address.is_change,
        "publicKey": address.public_key,
    }))
}

fn cmd_inspect(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let address = opts.target.as_deref().ok_or_else(|| anyhow!("Missing address"))?;
    Ok(serde_json::to_value(inspect(address)?)?)
}
