//! Interactive blockchain node shell.
//!
//! Boots the chain from `<datadir>/data/blocks.dat`, appends the
//! configured genesis block when the chain is empty, then reads operator
//! commands from stdin. Command errors are printed and the loop
//! continues; `stop` persists the chain and exits cleanly.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;

use chainee_core::{Block, Blockchain, Config};

const INTRO: &str = r#"
   _____ _    _          _____ _   _ ______ ______
  / ____| |  | |   /\   |_   _| \ | |  ____|  ____|
 | |    | |__| |  /  \    | | |  \| | |__  | |__
 | |    |  __  | / /\ \   | | | . ` |  __| |  __|
 | |____| |  | |/ ____ \ _| |_| |\  | |____| |____
  \_____|_|  |_/_/    \_\_____|_| \_|______|______|

Type in 'help' for list of available commands"#;

const HELP: &str = "List of commands:
getaccount <address>    Prints balance and nonce
getblock <hash>         Prints content of a block
getblockcount           Prints number of blocks in chain
getblockhash <index>    Prints hash of a block by index
gettransaction <id>     Prints content of transaction
help                    Prints help
stop                    Stops node
submitblock <data>      Pushes block into chain";

#[derive(Parser)]
#[command(name = "chainee-node")]
#[command(about = "Blockchain node", version)]
struct Opts {
    /// Path to data directory
    #[arg(long, default_value = ".")]
    datadir: PathBuf,
    /// Print debug representations of command errors
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    let Ok(config) = Config::load(&opts.datadir) else {
        println!("Config in data dir not found. Quitting...");
        process::exit(1);
    };

    let mut chain = Blockchain::new(&opts.datadir);
    chain.load().context("failed to replay stored chain")?;
    chain.init_genesis(&config.genesis_beneficiary, config.genesis_timestamp)?;

    println!("{INTRO}");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // stdin closed; leave without persisting, like an interrupt
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();
        let result = match command.to_lowercase().as_str() {
            "getaccount" => get_account(&chain, &args),
            "getblock" => get_block(&chain, &args),
            "getblockcount" => {
                println!("{}", chain.block_count());
                Ok(())
            }
            "getblockhash" => get_block_hash(&chain, &args),
            "gettransaction" => get_transaction(&chain, &args),
            "help" => {
                println!("{HELP}");
                Ok(())
            }
            "stop" => {
                chain.save()?;
                return Ok(());
            }
            "submitblock" => submit_block(&mut chain, &args),
            _ => {
                println!("Unrecognized command");
                Ok(())
            }
        };
        if let Err(err) = result {
            println!("{err}");
            if opts.debug {
                println!("{err:?}");
            }
        }
    }
}

fn get_account(chain: &Blockchain, args: &[&str]) -> anyhow::Result<()> {
    let address = args.first().context("Missing argument: address")?;
    println!(
        "{}",
        serde_json::json!({
            "balance": chain.get_balance(address),
            "nonce": chain.get_nonce(address),
        })
    );
    Ok(())
}

fn get_block(chain: &Blockchain, args: &[&str]) -> anyhow::Result<()> {
    let hash = args.first().context("Missing argument: hash")?;
    let block = chain.get_block(hash).context("Block not found")?;
    println!("{}", serde_json::to_string_pretty(&block.to_json()?)?);
    Ok(())
}

fn get_block_hash(chain: &Blockchain, args: &[&str]) -> anyhow::Result<()> {
    let number = args
        .first()
        .context("Missing argument: index")?
        .parse()
        .context("Index must be an integer")?;
    let hash = chain.get_block_hash(number).context("Block not found")?;
    println!("{hash}");
    Ok(())
}

fn get_transaction(chain: &Blockchain, args: &[&str]) -> anyhow::Result<()> {
    let id = args.first().context("Missing argument: id")?;
    let transaction = chain.get_transaction(id).context("Transaction not found")?;
    println!("{}", serde_json::to_string_pretty(&transaction.to_json()?)?);
    Ok(())
}

fn submit_block(chain: &mut Blockchain, args: &[&str]) -> anyhow::Result<()> {
    let data = hex::decode(args.first().context("Missing argument: data")?)?;
    let block = Block::deserialize(&data)?;
    chain.add_block(block)?;
    Ok(())
}
