//! Offline blockchain helper tools.
//!
//! Constructors and inspectors for the hex wire formats, plus key
//! generation and raw sign/recover/hash helpers. Nothing here touches a
//! data directory; every command reads its arguments and prints to
//! stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};

use chainee_core::{crypto, timestamp, Block, Transaction};

#[derive(Parser)]
#[command(name = "chainee-tools")]
#[command(about = "Blockchain helper tools", version)]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a serialized block
    #[command(name = "createblock")]
    CreateBlock {
        #[arg(long)]
        number: u32,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        beneficiary: String,
        #[arg(long)]
        target: u32,
        /// Defaults to the current time
        #[arg(long)]
        timestamp: Option<u32>,
        #[arg(long)]
        nonce: u32,
        /// Serialized transactions to include, hex
        transactions: Vec<String>,
    },
    /// Creates a signed serialized transaction
    #[command(name = "createtransaction")]
    CreateTransaction {
        #[arg(long)]
        nonce: u16,
        /// Outputs as a JSON object: {"address":amount,...}
        #[arg(long)]
        out: String,
        #[arg(long)]
        private_key: String,
    },
    /// Decodes a serialized block
    #[command(name = "decodeblock")]
    DecodeBlock { data: String },
    /// Decodes a serialized transaction
    #[command(name = "decodetransaction")]
    DecodeTransaction { data: String },
    /// Generates a new address
    #[command(name = "generateaddress")]
    GenerateAddress {
        /// Derive the key deterministically from a seed
        #[arg(long)]
        seed: Option<String>,
    },
    /// Recovers the signer address from a message and signature
    #[command(name = "recover")]
    Recover {
        message: String,
        signature: String,
        /// Treat the message as hex instead of UTF-8
        #[arg(long)]
        hex: bool,
    },
    /// Calculates a SHA3-256 hash
    #[command(name = "sha3")]
    Sha3 {
        input: String,
        /// Treat the input as hex instead of UTF-8
        #[arg(long)]
        hex: bool,
    },
    /// Signs a message
    #[command(name = "sign")]
    Sign {
        message: String,
        #[arg(long)]
        private_key: String,
        /// Treat the message as hex instead of UTF-8
        #[arg(long)]
        hex: bool,
    },
}

fn main() -> anyhow::Result<()> {
    match Opts::parse().command {
        Command::CreateBlock {
            number,
            parent,
            beneficiary,
            target,
            timestamp: block_timestamp,
            nonce,
            transactions,
        } => {
            let mut block = Block::new(
                number,
                &parent,
                &beneficiary,
                target,
                block_timestamp.unwrap_or_else(timestamp),
                nonce,
                Vec::new(),
            )?;
            for serialized in &transactions {
                block.add_transaction(Transaction::deserialize(&hex::decode(serialized)?)?)?;
            }
            println!("{}", hex::encode(block.serialize(true)));
        }
        Command::CreateTransaction {
            nonce,
            out,
            private_key,
        } => {
            let outputs: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&out).context("outputs must be a JSON object")?;
            let mut transaction = Transaction::new(nonce, &[])?;
            for (address, amount) in &outputs {
                let amount = amount
                    .as_u64()
                    .context("output amount must be a positive integer")?;
                transaction.set_out(address, amount)?;
            }
            transaction.sign(&private_key)?;
            println!("{}", hex::encode(transaction.serialize(true)));
        }
        Command::DecodeBlock { data } => {
            let block = Block::deserialize(&hex::decode(data)?)?;
            println!("{}", serde_json::to_string_pretty(&block.to_json()?)?);
        }
        Command::DecodeTransaction { data } => {
            let transaction = Transaction::deserialize(&hex::decode(data)?)?;
            println!("{}", serde_json::to_string_pretty(&transaction.to_json()?)?);
        }
        Command::GenerateAddress { seed } => {
            let private_key = match seed {
                Some(seed) => crypto::private_key_from_seed(&seed),
                None => crypto::generate_private_key(),
            };
            let pub_key = crypto::get_pub_key(&private_key)?;
            let address = crypto::address_from_public(&pub_key)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "address": address,
                    "private_key": private_key,
                    "pub_key": pub_key,
                }))?
            );
        }
        Command::Recover {
            message,
            signature,
            hex,
        } => {
            println!("{}", crypto::recover_str(&message, &signature, hex)?);
        }
        Command::Sha3 { input, hex } => {
            println!("{}", crypto::sha3_str(&input, hex)?);
        }
        Command::Sign {
            message,
            private_key,
            hex,
        } => {
            println!("{}", crypto::sign_str(&message, &private_key, hex)?);
        }
    }
    Ok(())
}
