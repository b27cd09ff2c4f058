use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Result};
use clap::Parser;
use cli::{
    build_tree_report, client::ServiceClient, consts::DEFAULT_SERVICE_URL, proof_hashes,
    utils::*, BatchContent, VoteInput,
};
use log::info;
use std::path::PathBuf;
use tokio::runtime::Builder;
use vote_ledger::{merkle_helper::verify_helper, VoteLeaf};

#[derive(Clone, Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, env, default_value = DEFAULT_SERVICE_URL)]
    pub service_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Clone)]
pub enum Commands {
    /// Prints the leaf hash of a (voter, choice) pair.
    HashLeaf {
        #[arg(long, value_parser = parse_address)]
        voter: Address,

        #[arg(long)]
        choice_id: u64,
    },
    /// Builds a tree from a JSON array of votes and prints root and proofs.
    BuildRoot {
        #[arg(long, env, help = "Path to a JSON array of {voter, choiceId, signature?}")]
        votes_path: PathBuf,
    },
    VerifyProof {
        #[arg(long, value_parser = parse_hex_32)]
        leaf: B256,

        #[arg(long, value_delimiter = ',', value_parser = parse_hex_32, help = "Sibling hashes, bottom to top")]
        proof: Vec<B256>,

        #[arg(long, value_parser = parse_hex_32)]
        root: B256,
    },
    /// Rebuilds the root of an anchored batch blob.
    InspectContent {
        #[arg(long, env, help = "Path to an anchored batch blob")]
        content_path: PathBuf,

        #[arg(long, value_parser = parse_address)]
        voter: Option<Address>,
    },
    Vote {
        #[arg(long)]
        voter: String,

        #[arg(long)]
        choice_id: u64,

        #[arg(long)]
        signature: String,
    },
    Validate {
        #[arg(long)]
        voter: String,

        #[arg(long)]
        choice_id: u64,
    },
    Batches {},
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(false)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        // === Offline tooling ===
        Commands::HashLeaf { voter, choice_id } => {
            let leaf = VoteLeaf::new(voter, choice_id);
            info!("Voter: {}", voter.to_checksum(None));
            println!("{}", leaf.hash());
        }
        Commands::BuildRoot { votes_path } => {
            let raw = read_file_with_limit(&votes_path, max_input_bytes())?;
            let inputs: Vec<VoteInput> = serde_json::from_slice(&raw)?;
            info!("Building tree over {} votes", inputs.len());

            let report = build_tree_report(&inputs)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::VerifyProof { leaf, proof, root } => {
            verify_helper(leaf, &proof, root).map_err(|e| anyhow!("{e}"))?;
            println!("valid");
        }
        Commands::InspectContent {
            content_path,
            voter,
        } => {
            let raw = read_file_with_limit(&content_path, max_input_bytes())?;
            let content = BatchContent::from_bytes(&raw)?;
            let tree = content.rebuild_tree()?;

            info!("Votes: {}", content.valid_votes.len());
            info!("Declared root: {}", content.merkle_root);
            info!("Rebuilt root: {}", tree.root());
            if tree.root() != content.merkle_root {
                println!("declared root does not match content");
            }

            if let Some(voter) = voter {
                let (index, proof) = content
                    .proof_for(&tree, &voter)?
                    .ok_or_else(|| anyhow!("{} is not in this batch", voter.to_checksum(None)))?;
                info!("Leaf index: {}", index);
                info!("Proof hashes: {:?}", proof_hashes(&proof));
                println!("{}", serde_json::to_string_pretty(&proof)?);
            } else {
                println!("{}", tree.root());
            }
        }

        // === Service calls ===
        Commands::Vote {
            ref voter,
            choice_id,
            ref signature,
        } => {
            let runtime = Builder::new_multi_thread().enable_all().build()?;
            let client = ServiceClient::new(&cli.service_url)?;
            let resp = runtime.block_on(client.submit_vote(voter, choice_id, signature))?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Validate {
            ref voter,
            choice_id,
        } => {
            let runtime = Builder::new_multi_thread().enable_all().build()?;
            let client = ServiceClient::new(&cli.service_url)?;
            let resp = runtime.block_on(client.validate_vote(voter, choice_id))?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Batches {} => {
            let runtime = Builder::new_multi_thread().enable_all().build()?;
            let client = ServiceClient::new(&cli.service_url)?;
            let resp = runtime.block_on(client.batches())?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}
