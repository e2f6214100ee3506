//! MPDB CLI Client
//!
//! Command-line interface for interacting with MPDB.

use std::fs;
use std::process;

use clap::{Parser, Subcommand};
use mpdb::network::Client;
use mpdb::protocol::{CommandType, Response};
use mpdb::{MpdbError, Result};
use serde_json::{json, Value};

/// MPDB CLI
#[derive(Parser, Debug)]
#[command(name = "mpdb-cli")]
#[command(about = "CLI for the MPDB document store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8008")]
    server: String,

    /// Log in as this user before running the command
    #[arg(short, long, env = "MPDB_USER")]
    user: Option<String>,

    /// Password for --user
    #[arg(short, long, env = "MPDB_PASSWORD", requires = "user")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a data command (create, read, update, delete, search, list)
    Run {
        /// Command verb
        verb: String,

        /// JSON payload
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Register a new user
    Register {
        username: String,
        password: String,

        #[arg(long)]
        email: Option<String>,
    },

    /// Grant a user access to a database (admin only)
    Grant {
        /// Target username or user id
        target: String,

        /// Database name, or * for all databases
        database: String,

        /// "*" or a comma separated list of read, write, delete
        permissions: String,
    },

    /// Export a database, collection or document as JSON
    Export {
        #[arg(long)]
        database: Option<String>,

        #[arg(long)]
        collection: Option<String>,

        #[arg(long)]
        document: Option<String>,
    },

    /// Import newline-delimited create payloads from a file
    Import {
        file: String,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(&args.server)?;

    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        let response = client.login(user, password)?;
        if !response.is_success() {
            print_response(&response)?;
            process::exit(2);
        }
    }

    let response = match args.command {
        Commands::Run { verb, payload } => {
            let kind = CommandType::parse(&verb)
                .filter(|kind| kind.is_data_command())
                .ok_or_else(|| MpdbError::validation(format!("Unknown command: {}", verb)))?;
            let payload: Value = serde_json::from_str(&payload)?;
            client.call(kind, &payload)?
        }
        Commands::Register {
            username,
            password,
            email,
        } => {
            let mut payload = json!({ "username": username, "password": password });
            if let Some(email) = email {
                payload["email"] = Value::String(email);
            }
            client.call(CommandType::Register, &payload)?
        }
        Commands::Grant {
            target,
            database,
            permissions,
        } => {
            let permissions = if permissions.trim() == "*" {
                json!("*")
            } else {
                json!(permissions.split(',').map(str::trim).collect::<Vec<_>>())
            };
            client.call(
                CommandType::SetPermission,
                &json!({ "targetUser": target, "database": database, "permissions": permissions }),
            )?
        }
        Commands::Export {
            database,
            collection,
            document,
        } => {
            let tree = client.export(&json!({
                "database": database,
                "collection": collection,
                "document": document,
            }))?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
            return Ok(());
        }
        Commands::Import { file } => client.import(fs::read(&file)?)?,
    };

    print_response(&response)?;
    if !response.is_success() {
        process::exit(2);
    }
    Ok(())
}

fn print_response(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
