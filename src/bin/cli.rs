//! QuartzKV CLI Client
//!
//! Command-line interface for interacting with a QuartzKV node.
//!
//! Uses a single TCP stream for sequential write-then-read, the same
//! pattern as the client library. Writes sent to a follower fail with
//! the leader's address so the caller can retry against it.

use clap::{Parser, Subcommand};
use quartzkv::index::SearchMode;
use quartzkv::{Client, QuartzError};

/// QuartzKV CLI
#[derive(Parser, Debug)]
#[command(name = "quartzkv-cli")]
#[command(about = "CLI for the QuartzKV key-value store")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7420")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Set { key: String, value: String },

    /// Delete a key
    Delete { key: String },

    /// Set several key=value pairs atomically
    BulkSet {
        /// Pairs in key=value form
        #[arg(required = true)]
        pairs: Vec<String>,
    },

    /// Full-text search over stored values
    Search {
        query: String,

        /// Match any query token instead of all of them
        #[arg(long)]
        any: bool,
    },

    /// Similarity search over stored values
    SemSearch {
        query: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        k: u32,

        /// Minimum Jaccard similarity
        #[arg(short, long, default_value = "0.1")]
        threshold: f32,
    },
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&mut client, args.command) {
        match e {
            QuartzError::NotPrimary { leader: Some(addr) } => {
                eprintln!("error: not primary; retry against {}", addr);
            }
            other => eprintln!("error: {}", other),
        }
        std::process::exit(1);
    }
}

fn run(client: &mut Client, command: Commands) -> Result<(), QuartzError> {
    match command {
        Commands::Get { key } => match client.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            client.set(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            let existed = client.delete(key.as_bytes())?;
            println!("{}", if existed { "1" } else { "0" });
        }
        Commands::BulkSet { pairs } => {
            let mut parsed = Vec::with_capacity(pairs.len());
            for pair in &pairs {
                let Some((key, value)) = pair.split_once('=') else {
                    return Err(QuartzError::Config(format!(
                        "bad pair '{}': expected key=value",
                        pair
                    )));
                };
                parsed.push((key.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
            client.bulk_set(&parsed)?;
            println!("OK ({} pairs)", parsed.len());
        }
        Commands::Search { query, any } => {
            let mode = if any { SearchMode::Or } else { SearchMode::And };
            let keys = client.search(&query, mode)?;
            for key in &keys {
                println!("{}", String::from_utf8_lossy(key));
            }
            eprintln!("({} results)", keys.len());
        }
        Commands::SemSearch {
            query,
            k,
            threshold,
        } => {
            let hits = client.search_semantic(&query, k, threshold)?;
            for (key, score) in &hits {
                println!("{:.4}  {}", score, String::from_utf8_lossy(key));
            }
            eprintln!("({} results)", hits.len());
        }
    }
    Ok(())
}
